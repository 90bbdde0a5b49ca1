//! Visualization functions using Plotters for cluster analysis

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ndarray::Array2;
use plotters::prelude::*;

use crate::model::ClusterFit;

/// Color palette for different clusters
static CLUSTER_COLORS: [RGBColor; 6] = [
    RED,
    BLUE,
    GREEN,
    MAGENTA,
    CYAN,
    RGBColor(255, 165, 0),
];

fn cluster_color(cluster: usize) -> &'static RGBColor {
    CLUSTER_COLORS.get(cluster).unwrap_or(&BLACK)
}

/// File-name slug for a column name
fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Scatter plot of one column pair, points colored by cluster assignment
/// and centroids drawn as squares
pub fn plot_cluster_pair(
    features: &Array2<f64>,
    names: &[String],
    fit: &ClusterFit,
    x_col: usize,
    y_col: usize,
    output_path: &Path,
) -> crate::Result<()> {
    let xs: Vec<f64> = features.column(x_col).to_vec();
    let ys: Vec<f64> = features.column(y_col).to_vec();

    // Plot bounds with some padding
    let x_min = xs.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.1;
    let x_max = xs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.1;
    let y_min = ys.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.1;
    let y_max = ys.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.1;

    if !(x_min.is_finite() && x_max.is_finite() && y_min.is_finite() && y_max.is_finite()) {
        anyhow::bail!("non-finite bounds for columns {} and {}", x_col, y_col);
    }

    let title = format!("{} vs {} (colored by cluster)", names[x_col], names[y_col]);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc(names[x_col].as_str())
        .y_desc(names[y_col].as_str())
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    // Data points colored by cluster
    for (i, (&x, &y)) in xs.iter().zip(ys.iter()).enumerate() {
        let color = cluster_color(fit.labels[i]);
        chart.draw_series(std::iter::once(Circle::new((x, y), 4, color.filled())))?;
    }

    // Centroids as larger squares
    let dx = (x_max - x_min) * 0.015;
    let dy = (y_max - y_min) * 0.015;
    for (cluster_id, centroid) in fit.centroids.outer_iter().enumerate() {
        let cx = centroid[x_col];
        let cy = centroid[y_col];
        let color = cluster_color(cluster_id);

        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(cx - dx, cy - dy), (cx + dx, cy + dy)],
                color.filled(),
            )))?
            .label(format!("Cluster {} centroid", cluster_id))
            .legend(move |(x, y)| Rectangle::new([(x, y), (x + 10, y + 10)], color.filled()));
    }

    chart.configure_series_labels().draw()?;
    root.present()?;

    Ok(())
}

/// Render one scatter plot per pair of feature columns, capped at
/// `max_pairs` files. Returns the paths written.
pub fn plot_cluster_pairs(
    features: &Array2<f64>,
    names: &[String],
    fit: &ClusterFit,
    out_dir: &Path,
    max_pairs: usize,
) -> crate::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create plot directory {}", out_dir.display()))?;

    let mut written = Vec::new();
    'pairs: for x_col in 0..names.len() {
        for y_col in (x_col + 1)..names.len() {
            if written.len() >= max_pairs {
                break 'pairs;
            }
            let path = out_dir.join(format!(
                "scatter_{}_{}.png",
                slug(&names[x_col]),
                slug(&names[y_col])
            ));
            plot_cluster_pair(features, names, fit, x_col, y_col, &path)?;
            written.push(path);
        }
    }

    Ok(written)
}

/// Number of distinct column pairs a table of `n_cols` columns yields
pub fn pair_count(n_cols: usize) -> usize {
    n_cols * n_cols.saturating_sub(1) / 2
}

/// Number of distinct column triples a table of `n_cols` columns yields
pub fn triple_count(n_cols: usize) -> usize {
    if n_cols < 3 {
        0
    } else {
        n_cols * (n_cols - 1) * (n_cols - 2) / 6
    }
}

/// 3D scatter plot of one column triple, points colored by cluster
/// assignment
pub fn plot_cluster_triple(
    features: &Array2<f64>,
    names: &[String],
    fit: &ClusterFit,
    x_col: usize,
    y_col: usize,
    z_col: usize,
    output_path: &Path,
) -> crate::Result<()> {
    let xs: Vec<f64> = features.column(x_col).to_vec();
    let ys: Vec<f64> = features.column(y_col).to_vec();
    let zs: Vec<f64> = features.column(z_col).to_vec();

    let x_min = xs.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.1;
    let x_max = xs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.1;
    let y_min = ys.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.1;
    let y_max = ys.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.1;
    let z_min = zs.iter().fold(f64::INFINITY, |a, &b| a.min(b)) - 0.1;
    let z_max = zs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) + 0.1;

    if !(x_min.is_finite()
        && x_max.is_finite()
        && y_min.is_finite()
        && y_max.is_finite()
        && z_min.is_finite()
        && z_max.is_finite())
    {
        anyhow::bail!(
            "non-finite bounds for columns {}, {} and {}",
            x_col,
            y_col,
            z_col
        );
    }

    let title = format!(
        "{} vs {} vs {} (colored by cluster)",
        names[x_col], names[y_col], names[z_col]
    );

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .build_cartesian_3d(x_min..x_max, y_min..y_max, z_min..z_max)?;

    chart.configure_axes().draw()?;

    for (i, ((&x, &y), &z)) in xs.iter().zip(ys.iter()).zip(zs.iter()).enumerate() {
        let color = cluster_color(fit.labels[i]);
        chart.draw_series(std::iter::once(Circle::new((x, y, z), 3, color.filled())))?;
    }

    root.present()?;
    Ok(())
}

/// Render one 3D scatter plot per triple of feature columns, capped at
/// `max_triples` files. Returns the paths written.
pub fn plot_cluster_triples(
    features: &Array2<f64>,
    names: &[String],
    fit: &ClusterFit,
    out_dir: &Path,
    max_triples: usize,
) -> crate::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create plot directory {}", out_dir.display()))?;

    let mut written = Vec::new();
    'triples: for x_col in 0..names.len() {
        for y_col in (x_col + 1)..names.len() {
            for z_col in (y_col + 1)..names.len() {
                if written.len() >= max_triples {
                    break 'triples;
                }
                let path = out_dir.join(format!(
                    "scatter3d_{}_{}_{}.png",
                    slug(&names[x_col]),
                    slug(&names[y_col]),
                    slug(&names[z_col])
                ));
                plot_cluster_triple(features, names, fit, x_col, y_col, z_col, &path)?;
                written.push(path);
            }
        }
    }

    Ok(written)
}

/// Create a simple bar chart of cluster sizes
pub fn plot_cluster_sizes(fit: &ClusterFit, output_path: &Path) -> crate::Result<()> {
    let cluster_sizes = fit.cluster_sizes();
    let max_size = *cluster_sizes.iter().max().unwrap_or(&1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..(fit.n_clusters as f64), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Cluster ID")
        .y_desc("Number of Listings")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (cluster_id, &size) in cluster_sizes.iter().enumerate() {
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (cluster_id as f64 + 0.1, 0.0),
                (cluster_id as f64 + 0.9, size as f64),
            ],
            cluster_color(cluster_id).filled(),
        )))?;
    }

    root.present()?;
    Ok(())
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(fit: &ClusterFit, features: &Array2<f64>, names: &[String]) {
    println!("\n=== Cluster Statistics ===");
    println!("Algorithm: {}", fit.algorithm);
    println!("Number of clusters: {}", fit.n_clusters);
    println!("Total listings: {}", features.nrows());
    println!("Silhouette score: {:.3}", fit.silhouette);
    println!(
        "Within-cluster sum of squares: {:.2}",
        fit.inertia(features)
    );

    let cluster_sizes = fit.cluster_sizes();
    println!("\nCluster sizes:");
    for (i, &size) in cluster_sizes.iter().enumerate() {
        let percentage = (size as f64 / features.nrows() as f64) * 100.0;
        println!("  Cluster {}: {} listings ({:.1}%)", i, size, percentage);
    }

    println!("\nCluster centroids:");
    for (i, centroid) in fit.centroids.outer_iter().enumerate() {
        let rendered: Vec<String> = names
            .iter()
            .zip(centroid.iter())
            .map(|(name, value)| format!("{}={:.2}", name, value))
            .collect();
        println!("  Cluster {}: {}", i, rendered.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fit_clustering, Algorithm};
    use tempfile::tempdir;

    fn test_fit() -> (Array2<f64>, Vec<String>, ClusterFit) {
        let features = Array2::from_shape_vec(
            (8, 3),
            vec![
                0.0, 0.1, 0.0, //
                0.1, 0.0, 0.1, //
                0.05, 0.05, 0.0, //
                0.0, 0.0, 0.05, //
                1.0, 0.9, 1.0, //
                0.9, 1.0, 0.95, //
                1.0, 1.0, 1.0, //
                0.95, 0.9, 0.9,
            ],
        )
        .unwrap();
        let names = vec!["price".to_string(), "size_const".to_string(), "rooms_clean".to_string()];
        let fit = fit_clustering(&features, Algorithm::Kmeans, 2).unwrap();
        (features, names, fit)
    }

    #[test]
    fn test_plot_cluster_pair_writes_file() {
        let (features, names, fit) = test_fit();
        let dir = tempdir().unwrap();
        let path = dir.path().join("pair.png");

        plot_cluster_pair(&features, &names, &fit, 0, 1, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_plot_cluster_pairs_caps_output() {
        let (features, names, fit) = test_fit();
        let dir = tempdir().unwrap();

        // Three columns give three pairs, capped at two
        let written = plot_cluster_pairs(&features, &names, &fit, dir.path(), 2).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_plot_cluster_triple_writes_file() {
        let (features, names, fit) = test_fit();
        let dir = tempdir().unwrap();
        let path = dir.path().join("triple.png");

        plot_cluster_triple(&features, &names, &fit, 0, 1, 2, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_plot_cluster_triples_caps_output() {
        let (features, names, fit) = test_fit();
        let dir = tempdir().unwrap();

        // Three columns give exactly one triple
        let written = plot_cluster_triples(&features, &names, &fit, dir.path(), 5).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].exists());

        let none = plot_cluster_triples(&features, &names, &fit, dir.path(), 0).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_pair_and_triple_counts() {
        assert_eq!(pair_count(3), 3);
        assert_eq!(pair_count(23), 253);
        assert_eq!(triple_count(2), 0);
        assert_eq!(triple_count(3), 1);
        assert_eq!(triple_count(23), 1771);
    }

    #[test]
    fn test_plot_cluster_sizes_writes_file() {
        let (_features, _names, fit) = test_fit();
        let dir = tempdir().unwrap();
        let path = dir.path().join("sizes.png");

        plot_cluster_sizes(&fit, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("size_const"), "size_const");
        assert_eq!(slug("Price Area"), "price_area");
    }
}
