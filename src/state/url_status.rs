/// URL status definitions for tracking crawl progress
///
/// This module defines every state a URL can be in inside a job's frontier.
use std::fmt;

/// Represents the current state of a URL in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlStatus {
    // ===== Active States =====
    /// URL is waiting to be dispatched (first attempt or retry)
    Pending,

    /// URL is being fetched by a worker
    InFlight,

    // ===== Terminal States =====
    /// URL was fetched and extracted successfully
    Done,

    /// URL failed terminally or exhausted its retries
    Failed,

    /// URL is known but will not be fetched (already visited in a resumed run)
    Skipped,
}

impl UrlStatus {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }

    /// Returns true if this is an active state (URL may still be processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InFlight)
    }

    /// Returns true if the transition `self -> to` is legal
    ///
    /// Pending → InFlight → {Done | Pending (retry) | Failed}, and Pending →
    /// Skipped when a resumed state already settled the URL.
    pub fn can_transition_to(&self, to: UrlStatus) -> bool {
        matches!(
            (*self, to),
            (Self::Pending, Self::InFlight)
                | (Self::Pending, Self::Skipped)
                | (Self::InFlight, Self::Done)
                | (Self::InFlight, Self::Pending)
                | (Self::InFlight, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
