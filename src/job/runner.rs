use crate::config::{Config, DelayScope};
use crate::crawler::{Extractor, JobControl, PageFetcher, RateLimiter};
use crate::events::EventBus;
use crate::job::{Collaborators, CrawlJob, JobResult, JobSettings, JobSpec, ResumeMode};
use crate::output::JsonLinesSink;
use crate::state::StateStore;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Runs one job to completion for the batch scheduler
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, spec: Arc<JobSpec>, control: watch::Receiver<JobControl>) -> JobResult;
}

/// Where job state files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLocation {
    /// One `<id>.state.json` per job
    Dir(PathBuf),
    /// A single state file, for single-job configurations
    File(PathBuf),
}

impl StateLocation {
    pub fn store_for(&self, job_id: &str) -> StateStore {
        match self {
            Self::Dir(dir) => StateStore::for_job(dir, job_id),
            Self::File(path) => StateStore::new(path.clone()),
        }
    }
}

/// Runs real crawl jobs writing JSON Lines output
pub struct CrawlJobRunner {
    settings: JobSettings,
    state: StateLocation,
    mode: ResumeMode,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    events: EventBus,
    /// Set when `delay-scope = "global"`
    shared_limiter: Option<RateLimiter>,
}

impl CrawlJobRunner {
    pub fn new(
        config: &Config,
        state: StateLocation,
        mode: ResumeMode,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn Extractor>,
        events: EventBus,
    ) -> Self {
        let settings = JobSettings::from_config(config);
        let shared_limiter = match config.crawler.delay_scope {
            DelayScope::Global => Some(RateLimiter::new(settings.delay)),
            DelayScope::Job => None,
        };
        Self {
            settings,
            state,
            mode,
            fetcher,
            extractor,
            events,
            shared_limiter,
        }
    }

    fn limiter(&self) -> RateLimiter {
        match &self.shared_limiter {
            Some(shared) => shared.clone(),
            None => RateLimiter::new(self.settings.delay),
        }
    }
}

#[async_trait]
impl JobRunner for CrawlJobRunner {
    async fn run(&self, spec: Arc<JobSpec>, control: watch::Receiver<JobControl>) -> JobResult {
        let append = self.mode == ResumeMode::Resume;
        let sink = match JsonLinesSink::create(&spec.output, append).await {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                tracing::error!("[{}] Cannot open output {}: {}", spec.id, spec.output.display(), e);
                return JobResult::failed(
                    &spec.id,
                    Some(Utc::now()),
                    format!("cannot open output {}: {}", spec.output.display(), e),
                );
            }
        };

        let store = self.state.store_for(&spec.id);
        let io = Collaborators {
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            sink,
            limiter: self.limiter(),
            events: self.events.clone(),
        };

        CrawlJob::new(spec, self.settings, store, self.mode, io)
            .run(control)
            .await
    }
}
