//! Pisolab: listing exploration CLI
//!
//! This is the main entrypoint that chains cleaning, outlier removal,
//! scaling, optional feature ranking, the clustering sweep and plotting.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use pisolab::consts::EXCLUDED_COLS;
use pisolab::{cluster_sweep, data, preprocess, viz, Args};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    if args.verbose {
        println!("Pisolab - Listing Exploration Toolkit");
        println!("=====================================\n");
    }

    run_pipeline(&args)
}

/// Run the full exploration pipeline
fn run_pipeline(args: &Args) -> Result<()> {
    println!("=== Listing Exploration Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load and clean the listing table
    if args.verbose {
        println!("Step 1: Loading and cleaning listings");
        println!("  Input file: {}", args.input);
    }

    let clean_start = Instant::now();
    let raw = data::load_listings(&args.input)?;
    let cleaned = data::clean_listings(&raw)?;
    let output = data::select_output(&cleaned)?;
    let clean_time = clean_start.elapsed();

    println!("✓ Listings loaded and cleaned: {} rows", output.height());
    if args.verbose {
        println!("  Cleaning time: {:.2}s", clean_time.as_secs_f64());

        let counts = data::category_counts(&output, "district_clean")?;
        println!("\nListings per district:\n{}", counts.head(Some(10)));

        let priced = data::add_avg_price_area(&cleaned)?;
        let districts = priced.column("district_clean")?.str()?;
        let district_avgs = priced.column("avg_price_area")?.f64()?;
        let mut averages: HashMap<String, f64> = HashMap::new();
        for (district, avg) in districts.into_iter().zip(district_avgs.into_iter()) {
            if let (Some(district), Some(avg)) = (district, avg) {
                averages.insert(district.to_string(), avg);
            }
        }
        let mut averages: Vec<(String, f64)> = averages.into_iter().collect();
        averages.sort_by(|a, b| b.1.total_cmp(&a.1));
        println!("Most expensive districts (price per m2):");
        for (district, avg) in averages.iter().take(5) {
            println!("  {}: {:.0}", district, avg);
        }
    }

    if let Some(path) = &args.cleaned_output {
        data::write_listings(&output, path)?;
        println!("✓ Cleaned table written to: {}", path);
    }

    // Step 2: Remove statistical outliers
    if args.verbose {
        println!("\nStep 2: Removing outliers (1.5 x IQR rule)");
    }
    let filtered = preprocess::remove_outliers(&output, args.verbose)?;
    println!(
        "✓ Outliers removed: {} rows dropped, {} rows kept",
        output.height() - filtered.height(),
        filtered.height()
    );

    // Step 3: Scale numeric features into [0, 1]
    let scaled = preprocess::scale_features(&filtered)?;
    let matrix = preprocess::to_feature_matrix(&scaled, &EXCLUDED_COLS)?;
    println!(
        "✓ Features scaled and encoded: {} rows x {} features",
        matrix.data.nrows(),
        matrix.data.ncols()
    );

    // Step 4: Optional feature-importance report
    if let Some(target) = &args.target {
        if args.verbose {
            println!("\nStep 4: Ranking features against '{}'", target);
        }
        let report = preprocess::select_features(&matrix, target)?;
        println!("\n=== Feature Report (target: {}) ===", target);
        println!("Held-out R2: {:.3}", report.score);
        println!("Feature importances:");
        for (name, importance) in &report.importances {
            println!("  {:<20} {:>8.4}", name, importance);
        }
    }

    // Step 5: Clustering sweep
    let cluster_counts = args.parse_cluster_counts()?;
    if args.verbose {
        println!(
            "\nStep 5: Clustering sweep with {} over {:?}",
            args.algorithm, cluster_counts
        );
    }

    let sweep_start = Instant::now();
    let best = cluster_sweep(
        &matrix.data,
        &cluster_counts,
        args.algorithm,
        Path::new(&args.models_dir),
        args.verbose,
    )?;
    let sweep_time = sweep_start.elapsed();

    let best = match best {
        Some(fit) => fit,
        None => {
            println!("\nNo clustering achieved a positive silhouette score; nothing saved.");
            return Ok(());
        }
    };

    println!(
        "\n✓ Best fit: {} with {} clusters (silhouette {:.3})",
        best.algorithm, best.n_clusters, best.silhouette
    );
    if args.verbose {
        println!("  Sweep time: {:.2}s", sweep_time.as_secs_f64());
        println!("  Model artifacts saved to: {}", args.models_dir);
    }

    // Step 6: Visualization
    let plots_dir = Path::new(&args.plots_dir);
    let written = viz::plot_cluster_pairs(
        &matrix.data,
        &matrix.names,
        &best,
        plots_dir,
        args.max_plots,
    )?;
    viz::plot_cluster_sizes(&best, &plots_dir.join("cluster_sizes.png"))?;

    println!(
        "✓ {} pair plots and the cluster-size chart saved to: {}",
        written.len(),
        args.plots_dir
    );
    let total_pairs = viz::pair_count(matrix.names.len());
    if written.len() < total_pairs {
        println!(
            "  ({} of {} column pairs skipped; raise --max-plots to render more)",
            total_pairs - written.len(),
            total_pairs
        );
    }

    if args.plot_triples {
        let triples = viz::plot_cluster_triples(
            &matrix.data,
            &matrix.names,
            &best,
            plots_dir,
            args.max_plots,
        )?;
        println!("✓ {} triple plots saved to: {}", triples.len(), args.plots_dir);
        let total_triples = viz::triple_count(matrix.names.len());
        if triples.len() < total_triples {
            println!(
                "  ({} of {} column triples skipped; raise --max-plots to render more)",
                total_triples - triples.len(),
                total_triples
            );
        }
    }

    viz::print_cluster_statistics(&best, &matrix.data, &matrix.names);

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}
