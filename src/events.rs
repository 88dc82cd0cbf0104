//! Typed progress events
//!
//! Jobs and the batch scheduler publish what they are doing on an
//! [`EventBus`]. Anything that wants progress (the CLI logger, a UI, tests)
//! subscribes; nobody holds callbacks into the crawl.

use crate::job::JobResult;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something that happened during a batch
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// A job left the queue and is running
    JobStarted { job_id: String },

    /// Seeding finished
    SeedsResolved {
        job_id: String,
        seeds: usize,
        skipped_from_resume: usize,
    },

    /// A page was fetched, extracted and handed to the sink
    PageCrawled {
        job_id: String,
        url: String,
        title: Option<String>,
        new_links: usize,
    },

    /// A page failed and was queued again
    PageRetrying {
        job_id: String,
        url: String,
        attempt: u32,
        error: String,
    },

    /// A page failed for good
    PageFailed {
        job_id: String,
        url: String,
        error: String,
    },

    /// A checkpoint was written
    Checkpointed {
        job_id: String,
        visited: usize,
        failed: usize,
    },

    /// A job reached a terminal status
    JobFinished { result: JobResult },
}

/// Broadcast channel of [`CrawlEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CrawlEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event; events without subscribers are dropped
    pub fn emit(&self, event: CrawlEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
