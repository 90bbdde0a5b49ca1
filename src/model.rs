//! Clustering fits, silhouette scoring and serialized model artifacts

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use linfa::prelude::*;
use linfa_clustering::{GaussianMixtureModel, KMeans};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::consts::RANDOM_STATE;

/// Fixed menu of clustering algorithms offered by the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Algorithm {
    /// K-Means with Euclidean distance
    Kmeans,
    /// Gaussian mixture model, clusters taken from component responsibility
    Gmm,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Kmeans => "kmeans",
            Algorithm::Gmm => "gmm",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted clustering with its assignments and quality score
#[derive(Debug)]
pub struct ClusterFit {
    pub algorithm: Algorithm,
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for the training data
    pub labels: Array1<usize>,
    /// Cluster centroids (component means for a Gaussian mixture)
    pub centroids: Array2<f64>,
    /// Silhouette coefficient over the full dataset
    pub silhouette: f64,
}

impl ClusterFit {
    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Within-cluster sum of squares against the fitted centroids
    pub fn inertia(&self, features: &Array2<f64>) -> f64 {
        let mut inertia = 0.0;
        for (i, &cluster) in self.labels.iter().enumerate() {
            if cluster < self.centroids.nrows() {
                let point = features.row(i);
                let centroid = self.centroids.row(cluster);
                inertia += point
                    .iter()
                    .zip(centroid.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>();
            }
        }
        inertia
    }
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ndarray::ArrayView1<f64>, point2: &ndarray::ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Silhouette coefficient over the full dataset, in [-1, 1].
///
/// Fewer than two points, or a labelling with a single cluster, scores 0.
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>, n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    if n_samples < 2 || n_clusters < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        // a(i): mean distance to points in the same cluster
        let mut same_cluster_distances = Vec::new();
        let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); n_clusters];

        for j in 0..n_samples {
            if i == j {
                continue;
            }

            let other_point = features.row(j);
            let distance = euclidean_distance(&point, &other_point);
            let other_label = labels[j];

            if other_label == cluster_label {
                same_cluster_distances.push(distance);
            } else if other_label < n_clusters {
                other_cluster_distances[other_label].push(distance);
            }
        }

        let a_i = if same_cluster_distances.is_empty() {
            0.0
        } else {
            same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64
        };

        // b(i): smallest mean distance to any other cluster
        let b_i = other_cluster_distances
            .iter()
            .filter(|distances| !distances.is_empty())
            .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
            .fold(f64::INFINITY, f64::min);

        let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
            0.0
        } else {
            (b_i - a_i) / a_i.max(b_i)
        };

        silhouette_sum += silhouette_i;
    }

    silhouette_sum / n_samples as f64
}

/// Fit one clustering of the feature matrix with a seeded RNG
pub fn fit_clustering(
    features: &Array2<f64>,
    algorithm: Algorithm,
    n_clusters: usize,
) -> crate::Result<ClusterFit> {
    if n_clusters < 2 {
        anyhow::bail!("number of clusters must be at least 2, got {}", n_clusters);
    }
    if features.nrows() < n_clusters {
        anyhow::bail!(
            "number of data points ({}) must be at least equal to number of clusters ({})",
            features.nrows(),
            n_clusters
        );
    }

    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(RANDOM_STATE);

    let (labels, centroids) = match algorithm {
        Algorithm::Kmeans => {
            let model = KMeans::params_with(n_clusters, rng, L2Dist)
                .max_n_iterations(300)
                .tolerance(1e-4)
                .fit(&dataset)
                .context("k-means fit failed")?;
            (model.predict(features), model.centroids().clone())
        }
        Algorithm::Gmm => {
            let model = GaussianMixtureModel::params(n_clusters)
                .with_rng(rng)
                .max_n_iterations(300)
                .tolerance(1e-4)
                .fit(&dataset)
                .context("gaussian mixture fit failed")?;
            (model.predict(features), model.means().clone())
        }
    };

    let silhouette = silhouette_score(features, &labels, n_clusters);

    Ok(ClusterFit {
        algorithm,
        n_clusters,
        labels,
        centroids,
        silhouette,
    })
}

/// Serialized snapshot of a fitted clustering
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub algorithm: String,
    pub n_clusters: usize,
    pub silhouette: f64,
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl ModelArtifact {
    pub fn from_fit(fit: &ClusterFit) -> Self {
        ModelArtifact {
            algorithm: fit.algorithm.to_string(),
            n_clusters: fit.n_clusters,
            silhouette: fit.silhouette,
            centroids: fit
                .centroids
                .outer_iter()
                .map(|row| row.to_vec())
                .collect(),
            labels: fit.labels.to_vec(),
        }
    }

    /// Write the artifact into `dir`, named with algorithm, cluster count,
    /// truncated score and a timestamp
    pub fn save(&self, dir: &Path) -> crate::Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create model directory {}", dir.display()))?;

        let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
        let file_name = format!(
            "clst_{}_{}_listings_{}_{}.json",
            self.algorithm,
            self.n_clusters,
            (self.silhouette * 100.0) as i32,
            timestamp
        );
        let path = dir.join(file_name);

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write model artifact {}", path.display()))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact {}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Fit the chosen algorithm for each candidate cluster count, score every
/// fit by silhouette and keep the best.
///
/// Every fit that improves on the running best is persisted to `models_dir`
/// before the sweep moves on, mirroring an exploratory workflow where
/// intermediate winners are worth keeping.
pub fn cluster_sweep(
    features: &Array2<f64>,
    cluster_counts: &[usize],
    algorithm: Algorithm,
    models_dir: &Path,
    verbose: bool,
) -> crate::Result<Option<ClusterFit>> {
    let mut best: Option<ClusterFit> = None;
    let mut max_score = 0.0;

    for &n_clusters in cluster_counts {
        let fit = fit_clustering(features, algorithm, n_clusters)
            .with_context(|| format!("clustering failed for {} clusters", n_clusters))?;
        let score = fit.silhouette;

        if verbose {
            println!(
                "Silhouette score of {:5.4} with {} and {} clusters",
                score, algorithm, n_clusters
            );
        }

        if score > max_score {
            if !verbose {
                println!(
                    "Silhouette score of {:5.4} with {} and {} clusters",
                    score, algorithm, n_clusters
                );
            }

            let path = ModelArtifact::from_fit(&fit).save(models_dir)?;
            if verbose {
                println!("Saved model artifact to {}", path.display());
            }

            max_score = score;
            best = Some(fit);
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Two tight groups far apart in feature space
    fn blobs() -> Array2<f64> {
        Array2::from_shape_vec(
            (10, 2),
            vec![
                0.0, 0.1, //
                0.1, 0.0, //
                -0.1, 0.05, //
                0.05, -0.1, //
                0.0, 0.0, //
                10.0, 10.1, //
                10.1, 10.0, //
                9.9, 10.05, //
                10.05, 9.9, //
                10.0, 10.0,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_fit_kmeans_separates_blobs() {
        let features = blobs();
        let fit = fit_clustering(&features, Algorithm::Kmeans, 2).unwrap();

        assert_eq!(fit.n_clusters, 2);
        assert_eq!(fit.labels.len(), 10);
        assert_eq!(fit.centroids.shape(), &[2, 2]);
        assert!(fit.silhouette > 0.8, "silhouette was {}", fit.silhouette);

        // All points of one blob share a label
        let first = fit.labels[0];
        assert!(fit.labels.iter().take(5).all(|&l| l == first));
        assert!(fit.labels.iter().skip(5).all(|&l| l != first));
    }

    #[test]
    fn test_fit_gmm_assigns_all_points() {
        let features = blobs();
        let fit = fit_clustering(&features, Algorithm::Gmm, 2).unwrap();

        assert_eq!(fit.labels.len(), 10);
        assert!(fit.labels.iter().all(|&l| l < 2));
        assert_eq!(fit.cluster_sizes().iter().sum::<usize>(), 10);
    }

    #[test]
    fn test_invalid_cluster_counts() {
        let features = blobs();
        assert!(fit_clustering(&features, Algorithm::Kmeans, 1).is_err());
        assert!(fit_clustering(&features, Algorithm::Kmeans, 11).is_err());
    }

    #[test]
    fn test_silhouette_degenerate_cases() {
        let features = Array2::zeros((1, 2));
        let labels = Array1::zeros(1);
        assert_eq!(silhouette_score(&features, &labels, 2), 0.0);

        let features = blobs();
        let labels = Array1::zeros(10);
        assert_eq!(silhouette_score(&features, &labels, 1), 0.0);
    }

    #[test]
    fn test_inertia_non_negative() {
        let features = blobs();
        let fit = fit_clustering(&features, Algorithm::Kmeans, 2).unwrap();
        let inertia = fit.inertia(&features);
        assert!(inertia >= 0.0);
        assert!(inertia.is_finite());
    }

    #[test]
    fn test_cluster_sweep_picks_best_and_saves() {
        let features = blobs();
        let dir = tempdir().unwrap();

        let best = cluster_sweep(
            &features,
            &[2, 3],
            Algorithm::Kmeans,
            dir.path(),
            false,
        )
        .unwrap()
        .expect("sweep should find a positive-silhouette fit");

        // Two well-separated blobs: k = 2 must win
        assert_eq!(best.n_clusters, 2);

        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(!saved.is_empty());
    }

    #[test]
    fn test_artifact_round_trip() {
        let features = blobs();
        let fit = fit_clustering(&features, Algorithm::Kmeans, 2).unwrap();
        let dir = tempdir().unwrap();

        let path = ModelArtifact::from_fit(&fit).save(dir.path()).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("clst_kmeans_2_listings_"));

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.algorithm, "kmeans");
        assert_eq!(loaded.n_clusters, 2);
        assert_eq!(loaded.labels.len(), 10);
        assert_eq!(loaded.centroids.len(), 2);
        assert!((loaded.silhouette - fit.silhouette).abs() < 1e-12);
    }
}
