use crate::crawler::JobControl;
use std::sync::Arc;
use tokio::sync::watch;

/// Pause, resume and cancel a running job
///
/// Cancellation is final: once cancelled, pause and resume do nothing.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: String,
    control: Arc<watch::Sender<JobControl>>,
}

impl JobHandle {
    /// Creates a handle and the receiver the job listens on
    pub fn new(id: impl Into<String>) -> (Self, watch::Receiver<JobControl>) {
        let (tx, rx) = watch::channel(JobControl::Running);
        let handle = Self {
            id: id.into(),
            control: Arc::new(tx),
        };
        (handle, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobControl {
        *self.control.borrow()
    }

    pub fn pause(&self) {
        self.set(JobControl::Paused);
    }

    pub fn resume(&self) {
        self.set(JobControl::Running);
    }

    pub fn cancel(&self) {
        if self.set(JobControl::Cancelled) {
            tracing::info!("[{}] Cancellation requested", self.id);
        }
    }

    fn set(&self, target: JobControl) -> bool {
        self.control.send_if_modified(|current| {
            if *current == JobControl::Cancelled || *current == target {
                return false;
            }
            *current = target;
            true
        })
    }
}
