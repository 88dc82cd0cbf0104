//! Crawl jobs
//!
//! A [`CrawlJob`] binds one frontier, one executor run and one state file.
//! It loads or resets its state, discovers seeds, restores a resumed state,
//! runs the executor, flushes the final checkpoint and reports a
//! [`JobResult`].

mod handle;
mod result;
mod runner;
mod spec;

pub use handle::JobHandle;
pub use result::{JobResult, JobStats, JobStatus};
pub use runner::{CrawlJobRunner, JobRunner, StateLocation};
pub use spec::{job_specs, JobSpec, UrlSource};

use crate::config::Config;
use crate::crawler::{
    discover_sitemaps, ExecutorReport, ExecutorSettings, Extractor, FetchExecutor, Frontier,
    JobControl, PageFetcher, RateLimiter, RestoreSummary,
};
use crate::events::{CrawlEvent, EventBus};
use crate::output::OutputSink;
use crate::state::{AutosavePolicy, Checkpointer, CrawlState, StateStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What to do with an existing state file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Ignore it; the first checkpoint overwrites it
    Fresh,
    /// Load it and skip what it already covers
    Resume,
    /// Delete it before starting
    Reset,
}

/// Per-job settings derived from the configuration
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    pub executor: ExecutorSettings,
    pub autosave: AutosavePolicy,
    pub sitemap_alternate_links: bool,
    /// Minimum time between fetch starts
    pub delay: Duration,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            executor: ExecutorSettings::from_config(&config.crawler),
            autosave: AutosavePolicy {
                interval: Duration::from_secs(config.state.autosave_interval_secs),
                every_pages: config.state.autosave_every_pages,
            },
            sitemap_alternate_links: config.crawler.sitemap_alternate_links,
            delay: Duration::from_millis(config.crawler.delay_ms),
        }
    }
}

/// The collaborators a job talks to
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub sink: Arc<dyn OutputSink>,
    pub limiter: RateLimiter,
    pub events: EventBus,
}

/// One crawl job, ready to run
pub struct CrawlJob {
    spec: Arc<JobSpec>,
    settings: JobSettings,
    store: StateStore,
    mode: ResumeMode,
    io: Collaborators,
}

impl CrawlJob {
    pub fn new(
        spec: Arc<JobSpec>,
        settings: JobSettings,
        store: StateStore,
        mode: ResumeMode,
        io: Collaborators,
    ) -> Self {
        Self {
            spec,
            settings,
            store,
            mode,
            io,
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Spawns the job and returns a handle to control it
    pub fn start(self) -> (JobHandle, JoinHandle<JobResult>) {
        let (handle, control) = JobHandle::new(self.spec.id.clone());
        let task = tokio::spawn(self.run(control));
        (handle, task)
    }

    /// Runs the job to a terminal status
    pub async fn run(self, control: watch::Receiver<JobControl>) -> JobResult {
        let result = self.run_inner(control).await;
        self.io.events.emit(CrawlEvent::JobFinished {
            result: result.clone(),
        });
        result
    }

    async fn run_inner(&self, control: watch::Receiver<JobControl>) -> JobResult {
        let spec = &self.spec;
        let started = Utc::now();
        let clock = Instant::now();

        tracing::info!("[{}] Starting job '{}'", spec.id, spec.name);
        self.io.events.emit(CrawlEvent::JobStarted {
            job_id: spec.id.clone(),
        });

        let state = self.initial_state();
        let scope = match spec.scope() {
            Ok(scope) => scope,
            Err(e) => return JobResult::failed(&spec.id, Some(started), e),
        };

        let discovery = discover_sitemaps(
            self.io.fetcher.as_ref(),
            &spec.url_source.sitemap_urls,
            self.settings.sitemap_alternate_links,
        )
        .await;

        let mut frontier = Frontier::new(scope, spec.max_retries, spec.selectors_key.clone());
        let seeds = match frontier.seed(
            &spec.url_source.start_urls,
            &discovery.entries,
            spec.url_source.base_url.as_deref(),
        ) {
            Ok(seeds) => seeds,
            Err(e) => {
                tracing::error!("[{}] Discovery failed: {}", spec.id, e);
                let mut message = e.to_string();
                if !discovery.failures.is_empty() {
                    message.push_str(&format!("; sitemap errors: {}", discovery.failures.join("; ")));
                }
                return JobResult::failed(&spec.id, Some(started), message);
            }
        };

        let restored = if self.mode == ResumeMode::Resume {
            frontier.restore(&state)
        } else {
            RestoreSummary::default()
        };
        tracing::info!(
            "[{}] {} seeds ({} from sitemaps), {} already visited, {} failed re-queued",
            spec.id,
            seeds,
            discovery.entries.len(),
            restored.skipped,
            restored.failed_requeued
        );
        self.io.events.emit(CrawlEvent::SeedsResolved {
            job_id: spec.id.clone(),
            seeds,
            skipped_from_resume: restored.skipped,
        });

        let mut checkpointer =
            Checkpointer::new(self.store.clone(), state, self.settings.autosave);
        let executor = FetchExecutor::new(
            spec.id.clone(),
            self.settings.executor,
            Arc::clone(&self.io.fetcher),
            Arc::clone(&self.io.extractor),
            self.io.limiter.clone(),
            self.io.events.clone(),
        );
        let report = executor
            .run(&mut frontier, &mut checkpointer, self.io.sink.as_ref(), control)
            .await;

        // Final checkpoint; a failure is already logged by the checkpointer
        let _ = checkpointer.save(frontier.pending_urls()).await;

        let mut sink_errors = report.sink_errors;
        if let Err(e) = self.io.sink.finish().await {
            tracing::warn!("[{}] Failed to finish output: {}", spec.id, e);
            sink_errors += 1;
        }

        let state = checkpointer.into_state();
        let result = finish_result(spec, started, clock.elapsed(), &report, sink_errors, &state);
        tracing::info!(
            "[{}] Job {} after {:.1}s: {} pages, {} failed",
            spec.id,
            result.status,
            clock.elapsed().as_secs_f64(),
            report.pages_succeeded,
            report.pages_failed
        );
        result
    }

    fn initial_state(&self) -> CrawlState {
        match self.mode {
            ResumeMode::Resume => self.store.load_or_fresh(),
            ResumeMode::Reset => {
                if let Err(e) = self.store.reset() {
                    tracing::warn!("[{}] {}", self.spec.id, e);
                }
                CrawlState::new()
            }
            ResumeMode::Fresh => {
                if self.store.exists() {
                    tracing::warn!(
                        "[{}] Existing state at {} will be overwritten (use --resume to continue it)",
                        self.spec.id,
                        self.store.path().display()
                    );
                }
                CrawlState::new()
            }
        }
    }
}

/// Turns an executor report into the job's terminal result
///
/// A run where every attempted page failed and nothing was ever visited is a
/// failed job; otherwise page failures only show up in the error count.
fn finish_result(
    spec: &JobSpec,
    started: DateTime<Utc>,
    elapsed: Duration,
    report: &ExecutorReport,
    sink_errors: u64,
    state: &CrawlState,
) -> JobResult {
    let stats = JobStats {
        pages: report.pages_succeeded,
        duration: elapsed.as_secs_f64(),
        errors: report.pages_failed + sink_errors,
    };

    let (status, error) = if report.cancelled {
        let reason = if report.aborted > 0 {
            format!("cancelled, {} in-flight fetches aborted", report.aborted)
        } else {
            "cancelled".to_string()
        };
        (JobStatus::Cancelled, Some(reason))
    } else if report.pages_succeeded == 0 && report.pages_failed > 0 && state.visited_urls.is_empty() {
        (
            JobStatus::Failed,
            Some(format!("all {} pages failed", report.pages_failed)),
        )
    } else {
        (JobStatus::Completed, None)
    };

    JobResult {
        id: spec.id.clone(),
        status,
        stats: Some(stats),
        error,
        start_time: Some(started),
        end_time: Utc::now(),
    }
}
