//! Fetch executor - the crawl loop of one job
//!
//! The executor owns the job's frontier and checkpointer for the duration of
//! a run. It keeps up to `max_concurrent` worker tasks in a JoinSet; each
//! worker waits out its retry backoff and the rate limiter, fetches one URL
//! and extracts it. Results come back to the loop, which is the only place
//! the frontier and crawl state are mutated.

use crate::config::CrawlerConfig;
use crate::crawler::extractor::{ExtractError, Extracted, Extractor};
use crate::crawler::fetcher::{FetchError, FetchedPage, PageFetcher};
use crate::crawler::frontier::{FailureOutcome, Frontier, NextUrl, Offer, UrlRecord};
use crate::crawler::throttle::{Backoff, RateLimiter};
use crate::events::{CrawlEvent, EventBus};
use crate::output::{OutputSink, PageRecord};
use crate::scope::canonicalize_url;
use crate::state::Checkpointer;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

/// Run state requested from outside the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControl {
    Running,
    /// Stop issuing fetches; in-flight fetches complete
    Paused,
    /// Stop issuing fetches and wind down
    Cancelled,
}

/// Why one page could not be crawled
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

impl PageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_retryable(),
            Self::Extract(_) => false,
        }
    }
}

/// Executor tuning taken from the crawler configuration
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub max_concurrent: usize,
    pub backoff: Backoff,
    pub cancel_grace: Duration,
    pub max_pages: Option<u64>,
}

impl ExecutorSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1) as usize,
            backoff: Backoff::new(Duration::from_millis(config.retry_backoff_ms)),
            cancel_grace: Duration::from_millis(config.cancel_grace_ms),
            max_pages: config.max_pages,
        }
    }
}

/// What happened during one executor run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorReport {
    pub pages_succeeded: u64,
    pub pages_failed: u64,
    pub retries: u64,
    pub sink_errors: u64,
    pub links_added: u64,
    /// Redirects onto a page another fetch already produced
    pub redirect_duplicates: u64,
    /// Most fetches in flight at once
    pub peak_in_flight: usize,
    pub cancelled: bool,
    /// In-flight fetches aborted when the cancel grace period ran out
    pub aborted: usize,
    pub worker_panics: usize,
    pub page_limit_reached: bool,
}

struct TaskOutcome {
    record: UrlRecord,
    result: Result<(FetchedPage, Extracted), PageError>,
}

/// Drives one job's frontier through the fetch/extract collaborators
pub struct FetchExecutor {
    job_id: String,
    settings: ExecutorSettings,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    limiter: RateLimiter,
    events: EventBus,
}

impl FetchExecutor {
    pub fn new(
        job_id: impl Into<String>,
        settings: ExecutorSettings,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn Extractor>,
        limiter: RateLimiter,
        events: EventBus,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            settings,
            fetcher,
            extractor,
            limiter,
            events,
        }
    }

    /// Crawls until the frontier is complete, the page limit is reached, or
    /// the job is cancelled
    ///
    /// On cancellation in-flight fetches get `cancel_grace` to finish before
    /// they are aborted. Aborted URLs stay InFlight in the frontier, so they
    /// are part of the pending list of the next checkpoint.
    pub async fn run(
        &self,
        frontier: &mut Frontier,
        checkpointer: &mut Checkpointer,
        sink: &dyn OutputSink,
        mut control: watch::Receiver<JobControl>,
    ) -> ExecutorReport {
        let mut report = ExecutorReport::default();
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut control_open = true;

        let tick = checkpointer.policy().interval.max(Duration::from_millis(100));
        let mut autosave = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        autosave.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let state = *control.borrow_and_update();
            if state == JobControl::Cancelled {
                report.cancelled = true;
                break;
            }

            if state == JobControl::Running {
                while tasks.len() < self.settings.max_concurrent {
                    if self.page_limit_hit(&report, tasks.len()) {
                        report.page_limit_reached = true;
                        break;
                    }
                    match frontier.next() {
                        NextUrl::Dispatch(record) => {
                            self.spawn_worker(&mut tasks, record);
                            report.peak_in_flight = report.peak_in_flight.max(tasks.len());
                        }
                        NextUrl::Drained | NextUrl::Complete => break,
                    }
                }
            }

            if tasks.is_empty() {
                if state == JobControl::Running {
                    break;
                }
                if !control_open {
                    tracing::warn!("[{}] Control handle dropped while paused, stopping", self.job_id);
                    report.cancelled = true;
                    break;
                }
            }

            tokio::select! {
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.handle_joined(joined, frontier, checkpointer, sink, &mut report).await;
                }
                changed = control.changed(), if control_open => {
                    if changed.is_err() {
                        control_open = false;
                    }
                }
                _ = autosave.tick() => {
                    self.save_if_due(frontier, checkpointer).await;
                }
            }
        }

        if report.cancelled && !tasks.is_empty() {
            self.drain(&mut tasks, frontier, checkpointer, sink, &mut report)
                .await;
        }

        let counts = frontier.counts();
        tracing::info!(
            "[{}] Executor finished: {} succeeded, {} failed, {} retries, {} pending",
            self.job_id,
            report.pages_succeeded,
            report.pages_failed,
            report.retries,
            counts.pending + counts.in_flight
        );
        report
    }

    fn page_limit_hit(&self, report: &ExecutorReport, in_flight: usize) -> bool {
        self.settings
            .max_pages
            .is_some_and(|max| report.pages_succeeded + in_flight as u64 >= max)
    }

    fn spawn_worker(&self, tasks: &mut JoinSet<TaskOutcome>, record: UrlRecord) {
        let fetcher = Arc::clone(&self.fetcher);
        let extractor = Arc::clone(&self.extractor);
        let limiter = self.limiter.clone();
        let delay = self.settings.backoff.delay(record.attempts.saturating_sub(1));

        tracing::debug!("[{}] Dispatching {} (attempt {})", self.job_id, record.key(), record.attempts);

        tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            limiter.until_ready().await;

            let result = match fetcher.fetch(record.key()).await {
                Ok(page) => extractor
                    .extract(&page, record.selectors_key.as_deref())
                    .map(|extracted| (page, extracted))
                    .map_err(PageError::from),
                Err(e) => Err(PageError::from(e)),
            };
            TaskOutcome { record, result }
        });
    }

    async fn drain(
        &self,
        tasks: &mut JoinSet<TaskOutcome>,
        frontier: &mut Frontier,
        checkpointer: &mut Checkpointer,
        sink: &dyn OutputSink,
        report: &mut ExecutorReport,
    ) {
        tracing::info!(
            "[{}] Cancelled, waiting up to {:?} for {} in-flight fetches",
            self.job_id,
            self.settings.cancel_grace,
            tasks.len()
        );

        let deadline = tokio::time::sleep(self.settings.cancel_grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(joined) => self.handle_joined(joined, frontier, checkpointer, sink, report).await,
                    None => break,
                },
                _ = &mut deadline => {
                    report.aborted = tasks.len();
                    tracing::warn!("[{}] Aborting {} fetches after grace period", self.job_id, report.aborted);
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }
    }

    async fn handle_joined(
        &self,
        joined: Result<TaskOutcome, JoinError>,
        frontier: &mut Frontier,
        checkpointer: &mut Checkpointer,
        sink: &dyn OutputSink,
        report: &mut ExecutorReport,
    ) {
        match joined {
            Ok(outcome) => self.handle_outcome(outcome, frontier, checkpointer, sink, report).await,
            Err(e) if e.is_panic() => {
                // The URL stays InFlight and is saved as pending for the next run
                tracing::error!("[{}] Worker panicked: {}", self.job_id, e);
                report.worker_panics += 1;
            }
            Err(_) => {}
        }
    }

    async fn handle_outcome(
        &self,
        outcome: TaskOutcome,
        frontier: &mut Frontier,
        checkpointer: &mut Checkpointer,
        sink: &dyn OutputSink,
        report: &mut ExecutorReport,
    ) {
        let TaskOutcome { record, result } = outcome;
        let key = record.key().to_string();
        let result = result.and_then(|(page, extracted)| {
            match canonicalize_url(page.final_url.clone()) {
                Ok(final_url) if final_url.as_str() != key && !frontier.in_scope(&final_url) => {
                    Err(PageError::Fetch(FetchError::Redirect(format!(
                        "redirected out of scope to {}",
                        final_url
                    ))))
                }
                _ => Ok((page, extracted)),
            }
        });

        match result {
            Ok((page, extracted)) => {
                if let Ok(final_url) = canonicalize_url(page.final_url.clone()) {
                    if final_url.as_str() != key {
                        if frontier.mark_alias(&final_url, &key) {
                            // The target's own fetch emits the record
                            tracing::debug!(
                                "[{}] {} redirected to already claimed {}",
                                self.job_id,
                                key,
                                final_url
                            );
                            frontier.mark_done(&key);
                            checkpointer.record_alias(&key);
                            report.redirect_duplicates += 1;
                            self.save_if_due(frontier, checkpointer).await;
                            return;
                        }
                        checkpointer.record_alias(final_url.as_str());
                    }
                }

                let mut new_links = 0;
                for link in &extracted.links {
                    if frontier.offer(link, Some(&key)) == Offer::Added {
                        new_links += 1;
                    }
                }

                let title = extracted.title.clone();
                let page_record = build_page_record(&self.job_id, &record, &page, extracted);
                if let Err(e) = sink.accept(&page_record).await {
                    tracing::warn!("[{}] Output sink rejected {}: {}", self.job_id, key, e);
                    report.sink_errors += 1;
                }

                frontier.mark_done(&key);
                checkpointer.record_success(&key);
                report.pages_succeeded += 1;
                report.links_added += new_links as u64;

                tracing::debug!("[{}] Crawled {} ({} new links)", self.job_id, key, new_links);
                self.events.emit(CrawlEvent::PageCrawled {
                    job_id: self.job_id.clone(),
                    url: key,
                    title,
                    new_links,
                });
            }
            Err(error) => {
                let message = error.to_string();
                match frontier.mark_failed(&key, message.clone(), error.is_retryable()) {
                    FailureOutcome::Retry { attempt } => {
                        tracing::debug!("[{}] Attempt {} of {} failed: {}", self.job_id, attempt, key, message);
                        report.retries += 1;
                        self.events.emit(CrawlEvent::PageRetrying {
                            job_id: self.job_id.clone(),
                            url: key,
                            attempt,
                            error: message,
                        });
                    }
                    FailureOutcome::Final => {
                        tracing::warn!("[{}] Failed {}: {}", self.job_id, key, message);
                        checkpointer.record_failure(&key);
                        report.pages_failed += 1;
                        self.events.emit(CrawlEvent::PageFailed {
                            job_id: self.job_id.clone(),
                            url: key,
                            error: message,
                        });
                    }
                }
            }
        }

        self.save_if_due(frontier, checkpointer).await;
    }

    async fn save_if_due(&self, frontier: &Frontier, checkpointer: &mut Checkpointer) {
        if checkpointer.save_if_due(|| frontier.pending_urls()).await {
            let state = checkpointer.state();
            self.events.emit(CrawlEvent::Checkpointed {
                job_id: self.job_id.clone(),
                visited: state.visited_urls.len(),
                failed: state.failed_urls.len(),
            });
        }
    }
}

fn build_page_record(job_id: &str, record: &UrlRecord, page: &FetchedPage, extracted: Extracted) -> PageRecord {
    PageRecord {
        job_id: job_id.to_string(),
        url: record.key().to_string(),
        final_url: page.final_url.to_string(),
        title: extracted.title,
        content: extracted.content,
        links: extracted.links,
        code_blocks: extracted.code_blocks,
        origin: record.origin,
        rank: record.rank,
        tags: record.tags.iter().cloned().collect(),
        selectors_key: record.selectors_key.clone(),
        status_code: page.status,
        fetched_at: Utc::now(),
    }
}
