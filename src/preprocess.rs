//! Outlier removal, feature scaling, matrix encoding and feature selection

use anyhow::Context;
use ndarray::Array2;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::consts::{EXCLUDED_COLS, OUTLIER_COLS, RANDOM_STATE};

/// Numeric feature table with one named column per feature
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Feature values, one row per listing
    pub data: Array2<f64>,
    /// Column name for each feature
    pub names: Vec<String>,
}

impl FeatureMatrix {
    /// Index of a named feature column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Held-out regression score and ranked feature importances
#[derive(Debug, Clone)]
pub struct FeatureReport {
    /// R² of the forest on the held-out split
    pub score: f64,
    /// (feature, importance) pairs sorted by descending importance
    pub importances: Vec<(String, f64)>,
}

/// Percentile of a sample with linear interpolation between ranks
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Drop every row flagged as an outlier in at least one configured column.
///
/// A value is an outlier when it falls outside [Q1 - step, Q3 + step] with
/// step = 1.5 × IQR. Missing values count as outliers for their column.
pub fn remove_outliers(df: &DataFrame, verbose: bool) -> crate::Result<DataFrame> {
    let mut flagged = vec![false; df.height()];

    for feature in OUTLIER_COLS {
        let values: Vec<Option<f64>> = df
            .column(feature)
            .with_context(|| format!("missing outlier column: {feature}"))?
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect();

        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            anyhow::bail!("outlier column {feature} has no values");
        }

        let q1 = percentile(&present, 25.0);
        let q3 = percentile(&present, 75.0);
        let step = 1.5 * (q3 - q1);

        let mut count = 0;
        for (i, value) in values.iter().enumerate() {
            let inside = matches!(value, Some(v) if *v >= q1 - step && *v <= q3 + step);
            if !inside {
                flagged[i] = true;
                count += 1;
            }
        }

        if verbose {
            println!(
                "Data points considered outliers for the feature '{}': {}",
                feature, count
            );
        }
    }

    let keep: Vec<bool> = flagged.iter().map(|f| !f).collect();
    let mask = BooleanChunked::from_slice("keep", &keep);
    Ok(df.filter(&mask)?)
}

/// Min-max scale every numeric non-excluded column into [0, 1].
///
/// Constant columns collapse to 0 so a zero range never divides.
pub fn scale_features(df: &DataFrame) -> crate::Result<DataFrame> {
    let mut out = df.clone();

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    for name in names {
        if EXCLUDED_COLS.contains(&name.as_str()) {
            continue;
        }
        let series = out.column(&name)?;
        if !series.dtype().is_numeric() {
            continue;
        }

        let values: Vec<Option<f64>> = series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect();

        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            continue;
        }
        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let scaled: Vec<Option<f64>> = values
            .iter()
            .map(|v| {
                v.map(|v| {
                    if range == 0.0 {
                        0.0
                    } else {
                        (v - min) / range
                    }
                })
            })
            .collect();

        out.with_column(Series::new(&name, scaled))?;
    }

    Ok(out)
}

/// Encode a cleaned frame as a numeric matrix.
///
/// Booleans become 0/1 and string categoricals get ordinal codes assigned
/// over their sorted distinct values; excluded columns are skipped.
pub fn to_feature_matrix(df: &DataFrame, excluded: &[&str]) -> crate::Result<FeatureMatrix> {
    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for series in df.get_columns() {
        let name = series.name().to_string();
        if excluded.contains(&name.as_str()) {
            continue;
        }

        let column: Vec<f64> = match series.dtype() {
            DataType::Boolean => series
                .bool()?
                .into_iter()
                .map(|v| if v.unwrap_or(false) { 1.0 } else { 0.0 })
                .collect(),
            DataType::String => {
                let values: Vec<String> = series
                    .str()?
                    .into_iter()
                    .map(|v| v.unwrap_or("unknown").to_string())
                    .collect();
                let mut categories: Vec<String> = values.clone();
                categories.sort();
                categories.dedup();
                values
                    .iter()
                    .map(|v| {
                        categories.iter().position(|c| c == v).unwrap_or(0) as f64
                    })
                    .collect()
            }
            _ => series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect(),
        };

        names.push(name);
        columns.push(column);
    }

    if columns.is_empty() {
        anyhow::bail!("no feature columns left after exclusions");
    }

    let nrows = columns[0].len();
    let ncols = columns.len();
    let data = Array2::from_shape_fn((nrows, ncols), |(i, j)| columns[j][i]);

    Ok(FeatureMatrix { data, names })
}

/// Coefficient of determination of predictions against true values
fn r_squared(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Rank features by how well they predict the target column.
///
/// Fits a random-forest regressor on a seeded 75/25 split and reports the
/// held-out R² plus permutation importances: the drop in R² when a single
/// feature column of the held-out split is shuffled.
pub fn select_features(matrix: &FeatureMatrix, target: &str) -> crate::Result<FeatureReport> {
    let target_idx = matrix
        .column_index(target)
        .ok_or_else(|| anyhow::anyhow!("target column not found: {target}"))?;

    let n_samples = matrix.data.nrows();
    if n_samples < 8 {
        anyhow::bail!(
            "need at least 8 rows for a train/test split, got {}",
            n_samples
        );
    }

    let feature_names: Vec<String> = matrix
        .names
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != target_idx)
        .map(|(_, n)| n.clone())
        .collect();

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n_samples);
    let mut y: Vec<f64> = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let row: Vec<f64> = (0..matrix.data.ncols())
            .filter(|j| *j != target_idx)
            .map(|j| matrix.data[[i, j]])
            .collect();
        rows.push(row);
        y.push(matrix.data[[i, target_idx]]);
    }

    // Seeded 75/25 split
    let mut rng = StdRng::seed_from_u64(RANDOM_STATE);
    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut rng);
    let test_len = (n_samples as f64 * 0.25).round().max(1.0) as usize;
    let (test_idx, train_idx) = indices.split_at(test_len);

    let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
    let train_y: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();
    let test_rows: Vec<Vec<f64>> = test_idx.iter().map(|&i| rows[i].clone()).collect();
    let test_y: Vec<f64> = test_idx.iter().map(|&i| y[i]).collect();

    let x_train = DenseMatrix::from_2d_vec(&train_rows);
    let x_test = DenseMatrix::from_2d_vec(&test_rows);

    let forest = RandomForestRegressor::fit(
        &x_train,
        &train_y,
        RandomForestRegressorParameters::default().with_seed(RANDOM_STATE),
    )?;

    let baseline = r_squared(&test_y, &forest.predict(&x_test)?);

    // Permutation importance: shuffle one held-out column at a time and
    // measure how much the score drops
    let mut importances = Vec::with_capacity(feature_names.len());
    for (j, name) in feature_names.iter().enumerate() {
        let mut permuted = test_rows.clone();
        let mut column: Vec<f64> = permuted.iter().map(|row| row[j]).collect();
        column.shuffle(&mut rng);
        for (row, value) in permuted.iter_mut().zip(column) {
            row[j] = value;
        }

        let x_permuted = DenseMatrix::from_2d_vec(&permuted);
        let permuted_score = r_squared(&test_y, &forest.predict(&x_permuted)?);
        importances.push((name.clone(), baseline - permuted_score));
    }

    importances.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(FeatureReport {
        score: baseline,
        importances,
    })
}
