//! Pricewatch main entry point
//!
//! This is the command-line interface for the Pricewatch catalog crawler.

use anyhow::{bail, Context};
use clap::Parser;
use pricewatch::config::{load_config_with_hash, validate, Config, RunMode};
use pricewatch::crawler::{seed_requests, Coordinator};
use pricewatch::output::{
    export_products, generate_markdown_summary, load_run_summary, print_statistics,
};
use pricewatch::storage::{SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Pricewatch: a price-record crawler for e-commerce catalogs
///
/// Pricewatch walks a shop's categories, subcategories and paginated
/// listings, extracts product prices and records each product once per run.
/// An interrupted run is resumed on the next invocation.
#[derive(Parser, Debug)]
#[command(name = "pricewatch")]
#[command(version = "1.0.0")]
#[command(about = "A price-record crawler for e-commerce catalogs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh run, ignoring an interrupted one
    #[arg(long)]
    fresh: bool,

    /// Override the run mode (full, test, promotional)
    #[arg(long, value_name = "MODE")]
    mode: Option<RunMode>,

    /// Explicit seed URL; may be repeated
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary", "export_products"])]
    dry_run: bool,

    /// Show statistics of the latest run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "export_products"])]
    stats: bool,

    /// Generate markdown summary of the latest run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_products"])]
    export_summary: bool,

    /// Write the latest run's products as JSON lines to PATH and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    export_products: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(mode) = cli.mode {
        config.run.mode = mode;
    }
    if !cli.seeds.is_empty() {
        config.run.seeds = cli.seeds.clone();
    }
    validate(&config).context("Invalid command-line overrides")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else if let Some(path) = &cli.export_products {
        handle_export_products(&config, path)?;
    } else {
        handle_crawl(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pricewatch=info,warn"),
            1 => EnvFilter::new("pricewatch=debug,info"),
            2 => EnvFilter::new("pricewatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Pricewatch Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    println!(
        "  Retries: {} (base delay {}ms)",
        config.crawler.max_request_retries, config.crawler.retry_delay_ms
    );
    println!(
        "  Request timeout: {}s",
        config.crawler.request_timeout_secs
    );
    if let Some(rpm) = config.crawler.max_requests_per_minute {
        println!("  Max requests per minute: {}", rpm);
    }
    if let Some(deadline) = config.crawler.run_deadline_secs {
        println!("  Run deadline: {}s", deadline);
    }
    println!(
        "  Checkpoint every {} requests",
        config.crawler.checkpoint_interval
    );

    println!("\nUser Agent:");
    println!(
        "  {}",
        pricewatch::crawler::user_agent_string(&config.user_agent)
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\nRun:");
    println!("  Name: {}", config.run.name);
    println!("  Mode: {}", config.run.mode.as_str());
    println!(
        "  Pagination: {:?} ({})",
        config.site.pagination.strategy, config.site.pagination.page_url_template
    );

    let seeds = seed_requests(&config.run)?;
    println!("\nSeeds ({}):", seeds.len());
    for seed in &seeds {
        println!("  - {} [{}]", seed.url(), seed.label());
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", seeds.len());

    Ok(())
}

/// Handles the --stats mode: shows statistics of the latest run
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    match load_run_summary(&storage, &config.run.name)? {
        Some(summary) => print_statistics(&summary),
        None => println!("No runs named '{}' found", config.run.name),
    }

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Run Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    tracing::info!("Loading run data from database...");
    let Some(summary) = load_run_summary(&storage, &config.run.name)? else {
        bail!("No runs named '{}' found", config.run.name);
    };

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Handles the --export-products mode: writes the latest run's products
fn handle_export_products(config: &Config, path: &Path) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

    let Some(run) = storage.get_latest_run(&config.run.name)? else {
        bail!("No runs named '{}' found", config.run.name);
    };

    let written = export_products(&storage, run.id, path)?;
    println!(
        "✓ Exported {} products of run {} to: {}",
        written,
        run.id,
        path.display()
    );

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh run (ignoring previous state)");
    } else {
        tracing::info!("Starting run (will resume if an interrupted run exists)");
    }
    tracing::info!(
        "Run '{}' in {} mode, {} explicit seeds",
        config.run.name,
        config.run.mode.as_str(),
        config.run.seeds.len()
    );

    let mut coordinator = Coordinator::new(config, config_hash, fresh)?;

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight requests");
            token.cancel();
        }
    });

    match coordinator.run().await {
        Ok(summary) => {
            tracing::info!(
                "Run {} {}: {} items found, {} duplicates, {} failed",
                summary.run_id,
                summary.status,
                summary.items_found,
                summary.items_duplicate,
                summary.failed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
