//! Review crawler main entry point
//!
//! This is the command-line interface for the resumable review crawler.

use anyhow::{bail, Context};
use clap::Parser;
use review_crawler::config::{load_config_with_hash, Config};
use review_crawler::crawler::{HttpReviewSource, Orchestrator, RunPlan, StartPosition};
use review_crawler::dataset::{
    export_work_items, filter_titles, load_work_items, work_list_path, DatasetFilter,
};
use review_crawler::output::{load_sink_statistics, print_sink_statistics, print_summary, OutputSink};
use review_crawler::storage::{CheckpointStore, FileCheckpointStore};
use review_crawler::CrawlError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Review crawler: resumable bulk review fetching
///
/// Walks an ordered list of title ids, fetching each title's reviews with
/// bounded concurrency and retries. Progress is checkpointed so an
/// interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "review-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A resumable bulk review crawler", long_about = None)]
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

    /// Resume from the saved checkpoint (default when no work list is given)
    #[arg(long, conflicts_with_all = ["dataset", "filter"])]
    resume: bool,

    /// Crawl this work list (CSV or TSV) from the beginning
    #[arg(long, value_name = "FILE", conflicts_with = "filter")]
    dataset: Option<PathBuf>,

    /// Start at this title id (inclusive) instead of the beginning
    #[arg(long, value_name = "ID", requires = "dataset")]
    start_from: Option<String>,

    /// Build a fresh work list by filtering an IMDb title.basics TSV
    #[arg(long, value_name = "TSV")]
    filter: Option<PathBuf>,

    /// Keep titles listing this genre
    #[arg(long, requires = "filter")]
    genre: Option<String>,

    /// Keep titles of this type (default: movie)
    #[arg(long, requires = "filter")]
    title_type: Option<String>,

    /// Keep titles released in or after this year
    #[arg(long, requires = "filter")]
    start_year: Option<u16>,

    /// Keep titles released in or before this year
    #[arg(long, requires = "filter")]
    end_year: Option<u16>,

    /// Keep only adult (true) or only non-adult (false) titles
    #[arg(long, requires = "filter")]
    adult: Option<bool>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics for the output sink and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config);
    }

    let plan = build_plan(&cli, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &plan);
        return Ok(());
    }

    handle_crawl(config, plan).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("review_crawler=info,warn"),
            1 => EnvFilter::new("review_crawler=debug,info"),
            2 => EnvFilter::new("review_crawler=trace,debug"),
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

/// Works out which list to crawl and where to start
fn build_plan(cli: &Cli, config: &Config) -> anyhow::Result<RunPlan> {
    let dataset_dir = Path::new(&config.output.dataset_dir);

    if let Some(basics) = &cli.filter {
        let filter = DatasetFilter {
            genre: cli.genre.clone(),
            title_type: cli.title_type.clone(),
            start_year: cli.start_year,
            end_year: cli.end_year,
            is_adult: cli.adult,
        };
        let name = filter.dataset_name();

        let items = filter_titles(basics, &filter)
            .with_context(|| format!("failed to filter {}", basics.display()))?;
        if items.is_empty() {
            bail!("no titles in {} match {:?}", basics.display(), filter);
        }

        if !cli.dry_run {
            let path = work_list_path(dataset_dir, &name);
            export_work_items(&items, &path)
                .with_context(|| format!("failed to export work list to {}", path.display()))?;
        }

        return Ok(RunPlan::new(name, items, StartPosition::Beginning));
    }

    if let Some(path) = &cli.dataset {
        let items = load_work_items(path)
            .with_context(|| format!("failed to load work list {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;

        // Resume reloads the list by name from the dataset directory
        let stored = work_list_path(dataset_dir, &name);
        if !cli.dry_run && stored != *path {
            export_work_items(&items, &stored)
                .with_context(|| format!("failed to copy work list to {}", stored.display()))?;
        }

        let start = match &cli.start_from {
            Some(id) => StartPosition::FromId(id.clone()),
            None => StartPosition::Beginning,
        };
        return Ok(RunPlan::new(name, items, start));
    }

    let checkpoint = FileCheckpointStore::new(&config.output.state_dir).load();
    if checkpoint.dataset_name.is_empty() {
        return Err(CrawlError::NothingToResume)
            .context("pass --dataset or --filter to start a new run");
    }

    let path = work_list_path(dataset_dir, &checkpoint.dataset_name);
    let items = load_work_items(&path).with_context(|| {
        format!(
            "failed to reload work list for dataset '{}'",
            checkpoint.dataset_name
        )
    })?;

    tracing::info!(
        "Resuming dataset '{}' after {}",
        checkpoint.dataset_name,
        if checkpoint.last_completed_id.is_empty() {
            "<start>"
        } else {
            checkpoint.last_completed_id.as_str()
        }
    );
    Ok(RunPlan::new(checkpoint.dataset_name, items, StartPosition::Checkpoint))
}

/// Handles the --dry-run mode: shows the configuration and the planned run
fn handle_dry_run(config: &Config, plan: &RunPlan) {
    println!("=== Review Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!(
        "  Retry delay: {}ms ({:?} backoff, max {}ms)",
        config.crawler.retry_delay_ms, config.crawler.backoff, config.crawler.max_retry_delay_ms
    );
    println!("  Expansion threshold: {}", config.crawler.expansion_threshold);
    println!(
        "  Submission jitter: {}-{}ms",
        config.crawler.jitter_min_ms, config.crawler.jitter_max_ms
    );

    println!("\nSource:");
    println!("  Base URL: {}", config.source.base_url);
    println!("  Reviews: {}", config.source.review_path);
    println!("  Expanded: {}", config.source.expand_path);
    println!("  User agents: {}", config.source.user_agents.len());

    println!("\nOutput:");
    println!("  Sink: {}", config.output.sink_path);
    println!("  Checkpoint dir: {}", config.output.state_dir);
    println!("  Dataset dir: {}", config.output.dataset_dir);
    if let Some(dir) = &config.output.reviews_dir {
        println!("  Reviews dir: {}", dir);
    }

    match &config.sync {
        Some(sync) => {
            println!("\nSync:");
            println!("  Bucket: {}", sync.bucket);
            println!(
                "  Every {} items or {}s",
                sync.interval, sync.timeout_secs
            );
            if let Some(endpoint) = &sync.endpoint {
                println!("  Endpoint: {}", endpoint);
            }
            if let Some(dir) = &sync.mirror_dir {
                println!("  Mirror dir: {}", dir);
            }
        }
        None => println!("\nSync: disabled"),
    }

    println!("\nPlan:");
    println!("  Dataset: {} ({} items)", plan.dataset_name, plan.items.len());
    println!("  Start: {:?}", plan.start);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: summarises the output sink
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = Path::new(&config.output.sink_path);
    let stats = load_sink_statistics(path)
        .with_context(|| format!("failed to read output sink {}", path.display()))?;
    print_sink_statistics(path, &stats);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, plan: RunPlan) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight items before exit");
                cancel.cancel();
            }
        }
    });

    let source = Arc::new(HttpReviewSource::new(&config.source).context("failed to build review source")?);

    let reviews_dir = config
        .output
        .reviews_dir
        .as_ref()
        .map(|dir| Path::new(dir).join(&plan.dataset_name));
    let sink = OutputSink::open(&config.output.sink_path, reviews_dir)
        .with_context(|| format!("failed to open output sink {}", config.output.sink_path))?;

    let orchestrator = Orchestrator::from_config(&config, source, sink, cancel)?;
    let summary = orchestrator.run(plan).await.context("crawl aborted")?;

    print_summary(&summary);
    Ok(())
}
