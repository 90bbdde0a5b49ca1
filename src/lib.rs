//! Pisolab: an exploration toolkit for scraped Spanish property listings
//!
//! The library cleans the raw listing table (Spanish free-text categorical
//! fields), removes statistical outliers, scales numeric features, ranks
//! features by predictive importance and clusters listings into natural
//! groupings, with scatter-plot visualization of the cluster assignments.

pub mod cli;
pub mod consts;
pub mod data;
pub mod model;
pub mod preprocess;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{clean_listings, load_listings, select_output, write_listings};
pub use model::{cluster_sweep, fit_clustering, Algorithm, ClusterFit, ModelArtifact};
pub use preprocess::{
    remove_outliers, scale_features, select_features, to_feature_matrix, FeatureMatrix,
    FeatureReport,
};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
