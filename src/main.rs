//! Doc-Harvester main entry point
//!
//! This is the command-line interface for the Doc-Harvester batch crawler.

use anyhow::Context;
use clap::Parser;
use doc_harvester::batch::{print_report, BatchScheduler, BatchSettings};
use doc_harvester::config::{load_config_with_hash, Config};
use doc_harvester::crawler::{FetchSettings, HtmlExtractor, HttpFetcher};
use doc_harvester::events::{CrawlEvent, EventBus};
use doc_harvester::job::{job_specs, CrawlJobRunner, ResumeMode, StateLocation};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Exit code for configuration and usage errors
const EXIT_CONFIG: u8 = 2;

/// Doc-Harvester: a resumable documentation crawler
///
/// Doc-Harvester crawls documentation sites from sitemaps and start pages,
/// writes every extracted page as a JSON line, checkpoints its progress so
/// an interrupted run can resume, and runs many such jobs as a batch.
#[derive(Parser, Debug)]
#[command(name = "doc-harvester")]
#[command(version)]
#[command(about = "A resumable documentation crawler", long_about = None)]
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

    /// Resume from saved state; PATH is a state directory, or the state
    /// file of a single-job configuration
    #[arg(long, value_name = "PATH", num_args = 0..=1, conflicts_with = "reset")]
    resume: Option<Option<PathBuf>>,

    /// Delete saved state before crawling
    #[arg(long)]
    reset: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Write the batch report to PATH (overrides `batch.report-path`)
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let (state, mode) = match state_location(&cli, &config) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, &state, mode);
        return ExitCode::SUCCESS;
    }

    match handle_batch(config, config_hash, state, mode, cli.report).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Batch failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("doc_harvester=info,warn"),
            1 => EnvFilter::new("doc_harvester=debug,info"),
            2 => EnvFilter::new("doc_harvester=trace,debug"),
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

/// Resolves where state lives and how an existing state file is treated
fn state_location(cli: &Cli, config: &Config) -> anyhow::Result<(StateLocation, ResumeMode)> {
    let default_dir = StateLocation::Dir(PathBuf::from(&config.state.dir));

    match &cli.resume {
        None if cli.reset => Ok((default_dir, ResumeMode::Reset)),
        None => Ok((default_dir, ResumeMode::Fresh)),
        Some(None) => Ok((default_dir, ResumeMode::Resume)),
        Some(Some(path)) if is_state_file(path) => {
            if config.jobs.len() != 1 {
                anyhow::bail!(
                    "--resume {} names a single state file but the config has {} jobs",
                    path.display(),
                    config.jobs.len()
                );
            }
            Ok((StateLocation::File(path.clone()), ResumeMode::Resume))
        }
        Some(Some(path)) => Ok((StateLocation::Dir(path.clone()), ResumeMode::Resume)),
    }
}

fn is_state_file(path: &Path) -> bool {
    !path.is_dir() && path.extension().is_some_and(|ext| ext == "json")
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, state: &StateLocation, mode: ResumeMode) {
    println!("=== Doc-Harvester Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max concurrent fetches per job: {}", config.crawler.max_concurrent);
    println!(
        "  Delay between fetches: {}ms ({:?} scope)",
        config.crawler.delay_ms, config.crawler.delay_scope
    );
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Timeout: {}ms", config.crawler.timeout_ms);
    println!(
        "  Redirects: {}",
        if config.crawler.follow_redirects {
            format!("followed (max {})", config.crawler.max_redirects)
        } else {
            "not followed".to_string()
        }
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nState:");
    match state {
        StateLocation::Dir(dir) => println!("  Directory: {}", dir.display()),
        StateLocation::File(path) => println!("  File: {}", path.display()),
    }
    println!("  Mode: {:?}", mode);

    println!("\nBatch:");
    println!("  Max parallel jobs: {}", config.batch.max_parallel);
    println!("  Continue on error: {}", config.batch.continue_on_error);

    let specs = job_specs(config);
    let scheduler_order = {
        let mut ordered: Vec<_> = specs.iter().collect();
        ordered.sort_by_key(|spec| std::cmp::Reverse(spec.priority));
        ordered
    };
    println!("\nJobs ({}), in start order:", specs.len());
    for spec in scheduler_order {
        println!(
            "  - {} '{}' (priority {}{})",
            spec.id,
            spec.name,
            spec.priority,
            if spec.required { "" } else { ", optional" }
        );
        for url in &spec.url_source.sitemap_urls {
            println!("    sitemap {}", url);
        }
        for url in &spec.url_source.start_urls {
            println!("    start   {}", url);
        }
        if let Some(base) = &spec.url_source.base_url {
            println!("    base    {}", base);
        }
        println!("    allowed {}", spec.allowed_domains.join(", "));
        println!("    output  {}", spec.output.display());
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main batch run
async fn handle_batch(
    config: Config,
    config_hash: String,
    state: StateLocation,
    mode: ResumeMode,
    report_override: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    match mode {
        ResumeMode::Resume => tracing::info!("Resuming from saved state"),
        ResumeMode::Reset => tracing::info!("Discarding saved state"),
        ResumeMode::Fresh => tracing::info!("Starting fresh crawl"),
    }

    let fetcher = HttpFetcher::new(&config.user_agent, FetchSettings::from_config(&config.crawler))
        .context("failed to build HTTP client")?;
    let events = EventBus::default();
    let logger = tokio::spawn(log_events(events.clone()));

    let runner = CrawlJobRunner::new(
        &config,
        state,
        mode,
        Arc::new(fetcher),
        Arc::new(HtmlExtractor),
        events.clone(),
    );

    let mut settings = BatchSettings::from_config(&config, Some(config_hash));
    if let Some(path) = report_override {
        settings.report_path = Some(path);
    }

    let scheduler = BatchScheduler::new(settings, job_specs(&config), Arc::new(runner), events);
    let handle = scheduler.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling batch (state will be saved)");
            handle.cancel();
        }
    });

    let outcome = scheduler.run().await;
    logger.abort();

    print_report(&outcome.report);
    println!("\nBatch {}", outcome.status.as_str());

    Ok(ExitCode::from(outcome.exit_code()))
}

/// Logs progress events until the bus closes
async fn log_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(CrawlEvent::PageCrawled { job_id, url, new_links, .. }) => {
                tracing::debug!("[{}] Crawled {} (+{} links)", job_id, url, new_links);
            }
            Ok(CrawlEvent::PageRetrying { job_id, url, attempt, error }) => {
                tracing::debug!("[{}] Retrying {} (attempt {}): {}", job_id, url, attempt, error);
            }
            Ok(CrawlEvent::Checkpointed { job_id, visited, failed }) => {
                tracing::trace!("[{}] Checkpoint: {} visited, {} failed", job_id, visited, failed);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::trace!("Event logger skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
