//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::model::Algorithm;

/// Listing exploration CLI: clean, filter, scale, rank and cluster a
/// scraped property-listing spreadsheet
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input Excel (.xlsx) file of scraped listings
    #[arg(short, long, default_value = "listings.xlsx")]
    pub input: String,

    /// Optional path to write the cleaned listing table back to .xlsx
    #[arg(long)]
    pub cleaned_output: Option<String>,

    /// Clustering algorithm to sweep
    #[arg(short, long, value_enum, default_value_t = Algorithm::Kmeans)]
    pub algorithm: Algorithm,

    /// Candidate cluster counts as a comma-separated list
    /// Example: --clusters "2,3,4,5" tries every count from 2 to 5
    #[arg(short = 'k', long, default_value = "2,3,4,5,6")]
    pub clusters: String,

    /// Target column for the feature-importance report (skipped when absent)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Directory for serialized model artifacts
    #[arg(long, default_value = "models")]
    pub models_dir: String,

    /// Directory for generated cluster plots
    #[arg(long, default_value = "plots")]
    pub plots_dir: String,

    /// Maximum number of pairwise scatter plots to render
    #[arg(long, default_value = "12")]
    pub max_plots: usize,

    /// Also render 3D scatter plots over column triples (capped by
    /// --max-plots as well)
    #[arg(long)]
    pub plot_triples: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the cluster-count list from the comma-separated flag value
    pub fn parse_cluster_counts(&self) -> crate::Result<Vec<usize>> {
        let counts: Vec<usize> = self
            .clusters
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("invalid cluster count: {}", part))
            })
            .collect::<crate::Result<_>>()?;

        if counts.is_empty() {
            anyhow::bail!("the cluster-count list must not be empty");
        }
        if let Some(bad) = counts.iter().find(|&&k| k < 2) {
            anyhow::bail!("cluster counts must be at least 2, got {}", bad);
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_clusters(clusters: &str) -> Args {
        Args {
            input: "listings.xlsx".to_string(),
            cleaned_output: None,
            algorithm: Algorithm::Kmeans,
            clusters: clusters.to_string(),
            target: None,
            models_dir: "models".to_string(),
            plots_dir: "plots".to_string(),
            max_plots: 12,
            plot_triples: false,
            verbose: false,
        }
    }

    #[test]
    fn test_parse_cluster_counts() {
        let args = args_with_clusters("2, 3,4");
        assert_eq!(args.parse_cluster_counts().unwrap(), vec![2, 3, 4]);

        let args = args_with_clusters("2,oops");
        assert!(args.parse_cluster_counts().is_err());

        let args = args_with_clusters("1,2");
        assert!(args.parse_cluster_counts().is_err());
    }
}
