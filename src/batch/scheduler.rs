use super::report::{spawn_report_writer, BatchReport};
use crate::config::Config;
use crate::crawler::JobControl;
use crate::events::{CrawlEvent, EventBus};
use crate::job::{JobHandle, JobResult, JobRunner, JobSpec};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// Settings of the batch layer
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Maximum number of jobs running at once
    pub max_parallel: usize,
    pub continue_on_error: bool,
    /// Rewritten after every finished job when set
    pub report_path: Option<PathBuf>,
    pub config_hash: Option<String>,
}

impl BatchSettings {
    pub fn from_config(config: &Config, config_hash: Option<String>) -> Self {
        Self {
            max_parallel: config.batch.max_parallel.max(1) as usize,
            continue_on_error: config.batch.continue_on_error,
            report_path: config.batch.report_path.as_ref().map(PathBuf::from),
            config_hash,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            continue_on_error: true,
            report_path: None,
            config_hash: None,
        }
    }
}

/// Overall result of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    /// Some jobs failed but the batch kept going
    CompletedWithErrors,
    /// A required job failed and the batch stopped early
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed with errors",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What a finished batch hands back to the caller
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub report: BatchReport,
    pub status: BatchStatus,
    /// Most jobs observed running at once
    pub peak_parallel: usize,
}

impl BatchOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self.status {
            BatchStatus::Completed | BatchStatus::CompletedWithErrors => 0,
            BatchStatus::Failed => 1,
            BatchStatus::Cancelled => 130,
        }
    }
}

/// Cancels a whole batch from outside the scheduler
#[derive(Debug, Clone)]
pub struct BatchHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        if self.cancel.send_if_modified(|c| !std::mem::replace(c, true)) {
            tracing::info!("Batch cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Runs jobs by priority with bounded parallelism
pub struct BatchScheduler {
    settings: BatchSettings,
    jobs: Vec<Arc<JobSpec>>,
    runner: Arc<dyn JobRunner>,
    events: EventBus,
    cancel: Arc<watch::Sender<bool>>,
}

impl BatchScheduler {
    /// Jobs are ordered by priority, highest first; ties keep input order.
    pub fn new(
        settings: BatchSettings,
        jobs: Vec<JobSpec>,
        runner: Arc<dyn JobRunner>,
        events: EventBus,
    ) -> Self {
        let mut jobs: Vec<Arc<JobSpec>> = jobs.into_iter().map(Arc::new).collect();
        // sort_by_key is stable
        jobs.sort_by_key(|job| std::cmp::Reverse(job.priority));
        let (cancel, _) = watch::channel(false);
        Self {
            settings,
            jobs,
            runner,
            events,
            cancel: Arc::new(cancel),
        }
    }

    /// Job ids in the order they will be started
    pub fn start_order(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.id.as_str()).collect()
    }

    pub fn cancel_handle(&self) -> BatchHandle {
        BatchHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Runs every job to a terminal status and returns the final report
    pub async fn run(self) -> BatchOutcome {
        let max_parallel = self.settings.max_parallel.max(1);
        let report = BatchReport::new(self.jobs.len(), self.settings.config_hash.clone());
        let (report_tx, report_task) =
            spawn_report_writer(report, self.settings.report_path.clone());

        tracing::info!(
            "Starting batch of {} jobs (max {} in parallel)",
            self.jobs.len(),
            max_parallel
        );

        let mut queued: VecDeque<Arc<JobSpec>> = self.jobs.iter().cloned().collect();
        let mut running: JoinSet<JobResult> = JoinSet::new();
        let mut handles: HashMap<String, JobHandle> = HashMap::new();
        let mut cancel_rx = self.cancel.subscribe();

        let mut cancelled = false;
        let mut stopped_early = false;
        let mut any_failed = false;
        let mut peak_parallel = 0;

        loop {
            if !cancelled && *cancel_rx.borrow_and_update() {
                cancelled = true;
                self.cancel_all(&handles, &mut queued, &report_tx);
            }

            while !cancelled && !stopped_early && running.len() < max_parallel {
                let Some(spec) = queued.pop_front() else {
                    break;
                };
                let handle = self.start_job(&mut running, spec);
                handles.insert(handle.id().to_string(), handle);
                peak_parallel = peak_parallel.max(running.len());
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                joined = running.join_next() => {
                    let result = match joined {
                        Some(Ok(result)) => result,
                        Some(Err(e)) => {
                            tracing::error!("Job task was lost: {}", e);
                            continue;
                        }
                        None => continue,
                    };
                    handles.remove(&result.id);
                    tracing::info!("Job '{}' finished: {}", result.id, result.status);

                    let mut stop_reason = None;
                    if result.is_failed() {
                        any_failed = true;
                        let required = self
                            .jobs
                            .iter()
                            .any(|job| job.id == result.id && job.required);
                        if required && !self.settings.continue_on_error && !stopped_early {
                            tracing::warn!(
                                "Required job '{}' failed, cancelling {} queued jobs",
                                result.id,
                                queued.len()
                            );
                            stopped_early = true;
                            stop_reason = Some(format!("cancelled: required job '{}' failed", result.id));
                        }
                    }

                    let _ = report_tx.send(result);
                    if let Some(reason) = stop_reason {
                        self.drain_queue(&mut queued, &reason, &report_tx);
                    }
                }
                changed = cancel_rx.changed(), if !cancelled => {
                    if changed.is_err() || *cancel_rx.borrow_and_update() {
                        cancelled = true;
                        self.cancel_all(&handles, &mut queued, &report_tx);
                    }
                }
            }
        }

        drop(report_tx);
        let report = match report_task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Report writer failed: {}", e);
                BatchReport::new(self.jobs.len(), self.settings.config_hash.clone())
            }
        };

        let status = if cancelled {
            BatchStatus::Cancelled
        } else if stopped_early {
            BatchStatus::Failed
        } else if any_failed {
            BatchStatus::CompletedWithErrors
        } else {
            BatchStatus::Completed
        };
        tracing::info!(
            "Batch {}: {} completed, {} failed, {} cancelled",
            status.as_str(),
            report.completed,
            report.failed,
            report.cancelled
        );

        BatchOutcome {
            report,
            status,
            peak_parallel,
        }
    }

    fn start_job(&self, running: &mut JoinSet<JobResult>, spec: Arc<JobSpec>) -> JobHandle {
        let (handle, control) = JobHandle::new(spec.id.clone());
        let runner = Arc::clone(&self.runner);
        tracing::debug!("Starting job '{}' (priority {})", spec.id, spec.priority);

        running.spawn(async move {
            let id = spec.id.clone();
            let started = Utc::now();
            // The inner task turns a panicking job into a failed result
            match tokio::spawn(async move { runner.run(spec, control).await }).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("[{}] Job task failed: {}", id, e);
                    JobResult::failed(&id, Some(started), format!("job task failed: {}", e))
                }
            }
        });
        handle
    }

    fn cancel_all(
        &self,
        handles: &HashMap<String, JobHandle>,
        queued: &mut VecDeque<Arc<JobSpec>>,
        report_tx: &mpsc::UnboundedSender<JobResult>,
    ) {
        tracing::warn!(
            "Cancelling batch: {} running, {} queued",
            handles.len(),
            queued.len()
        );
        for handle in handles.values() {
            handle.cancel();
        }
        self.drain_queue(queued, "cancelled: batch stopped before start", report_tx);
    }

    fn drain_queue(
        &self,
        queued: &mut VecDeque<Arc<JobSpec>>,
        reason: &str,
        report_tx: &mpsc::UnboundedSender<JobResult>,
    ) {
        for spec in queued.drain(..) {
            let result = JobResult::cancelled_before_start(&spec.id, reason);
            self.events.emit(CrawlEvent::JobFinished {
                result: result.clone(),
            });
            let _ = report_tx.send(result);
        }
    }
}
