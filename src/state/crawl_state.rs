use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Page counters persisted with the crawl state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStatistics {
    pub total_pages: u64,
    pub successful_pages: u64,
    pub failed_pages: u64,
}

/// Durable progress of one crawl job
///
/// Owned by exactly one job and mutated only by it. The executor updates it
/// for every URL that reaches a terminal status; the state store writes it to
/// disk on the autosave schedule and at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlState {
    pub start_time: DateTime<Utc>,
    pub visited_urls: BTreeSet<String>,
    pub failed_urls: BTreeSet<String>,
    pub statistics: CrawlStatistics,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    /// Discovered but not yet fetched when the snapshot was taken
    #[serde(default)]
    pub pending_urls: Vec<String>,
}

impl CrawlState {
    /// Creates an empty state starting now
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            visited_urls: BTreeSet::new(),
            failed_urls: BTreeSet::new(),
            statistics: CrawlStatistics::default(),
            saved_at: None,
            pending_urls: Vec::new(),
        }
    }

    /// Records a successfully processed URL
    ///
    /// A URL that failed in an earlier run and now succeeds moves from the
    /// failed set to the visited set.
    pub fn record_success(&mut self, url: &str) {
        self.failed_urls.remove(url);
        self.visited_urls.insert(url.to_string());
        self.recount();
    }

    /// Records a URL that reached its final failure
    pub fn record_failure(&mut self, url: &str) {
        if !self.visited_urls.contains(url) {
            self.failed_urls.insert(url.to_string());
        }
        self.recount();
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited_urls.contains(url)
    }

    pub fn is_failed(&self, url: &str) -> bool {
        self.failed_urls.contains(url)
    }

    /// Recomputes statistics from the URL sets
    ///
    /// Returns true if the stored counters disagreed with the sets.
    pub fn recount(&mut self) -> bool {
        let expected = CrawlStatistics {
            total_pages: (self.visited_urls.len() + self.failed_urls.len()) as u64,
            successful_pages: self.visited_urls.len() as u64,
            failed_pages: self.failed_urls.len() as u64,
        };
        let changed = expected != self.statistics;
        self.statistics = expected;
        changed
    }
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new()
    }
}
