//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest crawler.

use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::crawler::{CrawlManager, SelectorExtractor};
use catalog_harvest::output::{print_report, write_records_to};
use catalog_harvest::telemetry::{FanOutSink, PerformanceRecorder, PerformanceSink, TracingSink};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: resilient product catalog acquisition
///
/// Catalog-Harvest crawls a paginated product listing behind rate limits and
/// bot protection, using adaptive retries, fallback transports and
/// human-like timing, and writes the raw item records as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Resilient product catalog crawler", long_about = None)]
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

    /// Validate config and show the crawl plan without any network access
    #[arg(long)]
    dry_run: bool,

    /// Write records to this file instead of [output].records-path or stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Seed for fingerprints, delays and jitter (reproducible runs)
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Overall wall-clock budget for the crawl in seconds
    #[arg(long, value_name = "N")]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(seed) = cli.seed {
        config.evasion.seed = Some(seed);
    }
    if let Some(deadline) = cli.deadline_secs {
        config.crawl.deadline_secs = Some(deadline);
    }

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_crawl(&config, cli.output).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so records written to stdout stay machine-readable.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let extractor = SelectorExtractor::from_config(&config.extract)?;
    let manager = CrawlManager::from_config(config, Arc::new(TracingSink))?;
    let plan = manager.plan();

    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Entry URLs ({}):", plan.entry_urls.len());
    for url in &plan.entry_urls {
        println!("  - {}", url);
    }

    println!("\nWarmup Chain ({}):", plan.warmup_urls.len());
    for url in &plan.warmup_urls {
        println!("  - {}", url);
    }

    println!("\nSelectors:");
    println!("  Items: {}", config.target.item_selector);
    println!("  Pagination: {}", config.target.pagination_selector);
    println!("  Fields: {}", extractor.field_names().join(", "));

    println!("\nRetry Policy:");
    println!("  Max attempts: {}", plan.policy.max_attempts);
    println!(
        "  Backoff: {:?} x{} (max {:?}, jitter {})",
        plan.policy.base_delay,
        plan.policy.multiplier,
        plan.policy.max_delay,
        if plan.policy.jitter_enabled { "on" } else { "off" }
    );
    println!("  Rate-limit floor: {:?}", plan.policy.rate_limit_floor);

    println!("\nEscalation:");
    println!(
        "  Network: {}",
        if plan.constrained_network {
            "constrained"
        } else {
            "interactive"
        }
    );
    if plan.strategies.is_empty() {
        println!("  Strategies: none");
    } else {
        println!("  Strategies: {}", plan.strategies.join(" -> "));
    }

    println!("\nLimits:");
    println!("  Safety ceiling: {} pages", plan.safety_ceiling);
    match plan.deadline {
        Some(deadline) => println!("  Deadline: {}s", deadline.as_secs()),
        None => println!("  Deadline: none"),
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: &Config,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let extractor = SelectorExtractor::from_config(&config.extract)?;

    let recorder = Arc::new(PerformanceRecorder::new());
    let sink: Arc<dyn PerformanceSink> = Arc::new(FanOutSink::new(vec![
        recorder.clone() as Arc<dyn PerformanceSink>,
        Arc::new(TracingSink),
    ]));

    let mut manager = CrawlManager::from_config(config, sink)?;
    let report = manager.run(&extractor).await;

    let path = output.or_else(|| config.output.records_path.as_ref().map(PathBuf::from));
    write_records_to(&report.records, path.as_deref())?;

    print_report(&report, &recorder.summary());

    if report.entry_url.is_none() {
        tracing::error!("No entry URL could be fetched");
    }

    Ok(())
}
