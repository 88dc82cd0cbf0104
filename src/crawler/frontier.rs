//! URL frontier of one crawl job
//!
//! The frontier knows every URL a job has seen, keyed by canonical form, and
//! hands out Pending URLs in rank order. It is owned by the executor loop and
//! never shared, so it needs no locking.
//!
//! Per-URL lifecycle:
//!
//! ```text
//! Pending ─▶ InFlight ─▶ Done
//!    ▲          │
//!    └─ retry ──┤
//!               └──────▶ Failed (final)
//! Pending ─▶ Skipped   (settled by a resumed state or a redirect alias)
//! ```

use crate::crawler::sitemap::SitemapEntry;
use crate::scope::{canonicalize, CrawlScope, Rejection};
use crate::state::{CrawlState, UrlStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use thiserror::Error;
use url::Url;

/// How a URL entered the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UrlOrigin {
    Sitemap,
    Start,
    Discovered,
    AltLang,
}

impl UrlOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::Start => "start",
            Self::Discovered => "discovered",
            Self::AltLang => "alt-lang",
        }
    }

    fn tag(&self) -> String {
        format!("origin:{}", self.as_str())
    }
}

/// A URL known to the frontier
#[derive(Debug, Clone)]
pub struct UrlRecord {
    pub canonical_url: Url,
    pub origin: UrlOrigin,
    pub rank: i32,
    pub tags: BTreeSet<String>,
    pub selectors_key: Option<String>,
    pub status: UrlStatus,
    /// Fetch attempts started in this run
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Page the URL was discovered on
    pub found_on: Option<String>,
    /// Retries allowed after the first attempt
    pub retry_budget: u32,
}

impl UrlRecord {
    /// The dedup key: the canonical URL as a string
    pub fn key(&self) -> &str {
        self.canonical_url.as_str()
    }
}

/// What `next()` found
#[derive(Debug)]
pub enum NextUrl {
    /// A URL to fetch; it is now InFlight
    Dispatch(UrlRecord),
    /// Nothing Pending, but fetches are still in flight
    Drained,
    /// Nothing Pending or InFlight
    Complete,
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Added,
    Known,
    Rejected(Rejection),
    Invalid,
}

/// Result of recording a page failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Queued again; `attempt` is the attempt that just failed
    Retry { attempt: u32 },
    /// Finalized as Failed
    Final,
}

/// What `restore()` did with a saved state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub skipped: usize,
    pub failed_requeued: usize,
    pub pending_reoffered: usize,
}

/// Per-status record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The job could not start because no seed URL resolved
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no seed URL resolved ({starts} start URLs, {sitemap_entries} sitemap entries) and no base URL configured")]
    NoSeeds {
        starts: usize,
        sitemap_entries: usize,
    },

    #[error("base URL fallback {url} is unusable: {reason}")]
    UnusableBase { url: String, reason: String },
}

/// Heap entry: highest rank first, then lowest sequence number
#[derive(Debug, PartialEq, Eq)]
struct QueueEntry {
    rank: i32,
    seq: u64,
    key: String,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sitemap `<priority>` (0.0–1.0) scaled to a rank (0–10)
pub fn rank_from_priority(priority: Option<f32>) -> i32 {
    match priority {
        Some(p) if p.is_finite() => (p.clamp(0.0, 1.0) * 10.0).round() as i32,
        _ => 0,
    }
}

/// URL frontier of one job
pub struct Frontier {
    scope: CrawlScope,
    max_retries: u32,
    selectors_key: Option<String>,
    records: HashMap<String, UrlRecord>,
    queue: BinaryHeap<QueueEntry>,
    next_seq: u64,
    in_flight: usize,
}

impl Frontier {
    pub fn new(scope: CrawlScope, max_retries: u32, selectors_key: Option<String>) -> Self {
        Self {
            scope,
            max_retries,
            selectors_key,
            records: HashMap::new(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            in_flight: 0,
        }
    }

    /// Seeds the frontier from sitemap entries and explicit start URLs
    ///
    /// Sitemap entries keep their rank and language tags; a start URL that
    /// is also in a sitemap gains the `origin:start` tag. When nothing
    /// resolves, `base_url` becomes the only seed.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of distinct seeds in the frontier
    /// * `Err(DiscoveryError)` - Nothing resolved and no usable fallback
    pub fn seed(
        &mut self,
        start_urls: &[String],
        sitemap_entries: &[SitemapEntry],
        base_url: Option<&str>,
    ) -> Result<usize, DiscoveryError> {
        for entry in sitemap_entries {
            let origin = if entry.hreflang.is_some() {
                UrlOrigin::AltLang
            } else {
                UrlOrigin::Sitemap
            };
            let mut tags = BTreeSet::from([UrlOrigin::Sitemap.tag()]);
            if let Some(lang) = &entry.hreflang {
                tags.insert(format!("lang:{}", lang.to_lowercase()));
            }
            self.add_seed(
                &entry.loc,
                origin,
                rank_from_priority(entry.priority),
                tags,
            );
        }

        for url in start_urls {
            self.add_seed(url, UrlOrigin::Start, 0, BTreeSet::from([UrlOrigin::Start.tag()]));
        }

        if !self.records.is_empty() {
            return Ok(self.records.len());
        }

        let Some(base) = base_url else {
            return Err(DiscoveryError::NoSeeds {
                starts: start_urls.len(),
                sitemap_entries: sitemap_entries.len(),
            });
        };

        tracing::info!("No seeds resolved, falling back to base URL {}", base);
        let url = canonicalize(base).map_err(|e| DiscoveryError::UnusableBase {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        self.scope
            .check(&url)
            .map_err(|rejection| DiscoveryError::UnusableBase {
                url: base.to_string(),
                reason: format!("{:?}", rejection),
            })?;
        self.insert_pending(url, UrlOrigin::Start, 0, BTreeSet::from([UrlOrigin::Start.tag()]), None);
        Ok(1)
    }

    fn add_seed(&mut self, raw: &str, origin: UrlOrigin, rank: i32, tags: BTreeSet<String>) {
        let url = match canonicalize(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Skipping seed {}: {}", raw, e);
                return;
            }
        };
        if let Err(rejection) = self.scope.check(&url) {
            tracing::debug!("Seed {} out of scope: {:?}", url, rejection);
            return;
        }

        match self.records.get_mut(url.as_str()) {
            Some(existing) => {
                // Ranks only ever go up; heap entries with the old rank go stale
                existing.tags.extend(tags);
                if rank > existing.rank && existing.status == UrlStatus::Pending {
                    existing.rank = rank;
                    let key = existing.canonical_url.to_string();
                    self.push(rank, key);
                }
            }
            None => self.insert_pending(url, origin, rank, tags, None),
        }
    }

    /// Offers a discovered link
    pub fn offer(&mut self, raw: &str, from_page: Option<&str>) -> Offer {
        let url = match canonicalize(raw) {
            Ok(url) => url,
            Err(_) => return Offer::Invalid,
        };
        if self.records.contains_key(url.as_str()) {
            return Offer::Known;
        }
        if let Err(rejection) = self.scope.check(&url) {
            return Offer::Rejected(rejection);
        }

        self.insert_pending(
            url,
            UrlOrigin::Discovered,
            0,
            BTreeSet::from([UrlOrigin::Discovered.tag()]),
            from_page.map(str::to_string),
        );
        Offer::Added
    }

    fn insert_pending(
        &mut self,
        url: Url,
        origin: UrlOrigin,
        rank: i32,
        tags: BTreeSet<String>,
        found_on: Option<String>,
    ) {
        let key = url.to_string();
        let record = UrlRecord {
            canonical_url: url,
            origin,
            rank,
            tags,
            selectors_key: self.selectors_key.clone(),
            status: UrlStatus::Pending,
            attempts: 0,
            last_error: None,
            found_on,
            retry_budget: self.max_retries,
        };
        self.records.insert(key.clone(), record);
        self.push(rank, key);
    }

    fn push(&mut self, rank: i32, key: String) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueueEntry { rank, seq, key });
    }

    /// Takes the next URL to fetch and marks it InFlight
    pub fn next(&mut self) -> NextUrl {
        while let Some(entry) = self.queue.pop() {
            let Some(record) = self.records.get_mut(&entry.key) else {
                continue;
            };
            // Stale entry: already dispatched, settled, or re-ranked
            if record.status != UrlStatus::Pending || record.rank != entry.rank {
                continue;
            }
            record.status = UrlStatus::InFlight;
            record.attempts += 1;
            self.in_flight += 1;
            return NextUrl::Dispatch(record.clone());
        }

        if self.in_flight > 0 {
            NextUrl::Drained
        } else {
            NextUrl::Complete
        }
    }

    /// Records a successful fetch
    pub fn mark_done(&mut self, key: &str) {
        if let Some(record) = self.take_in_flight(key) {
            record.status = UrlStatus::Done;
            record.last_error = None;
        }
    }

    /// Records a failed fetch
    ///
    /// Retryable failures go back to Pending, behind URLs of the same rank,
    /// until the record's retry budget is used up.
    pub fn mark_failed(&mut self, key: &str, error: String, retryable: bool) -> FailureOutcome {
        let Some(record) = self.take_in_flight(key) else {
            return FailureOutcome::Final;
        };
        record.last_error = Some(error);

        let retries_used = record.attempts.saturating_sub(1);
        if retryable && retries_used < record.retry_budget {
            record.status = UrlStatus::Pending;
            let attempt = record.attempts;
            let rank = record.rank;
            self.push(rank, key.to_string());
            FailureOutcome::Retry { attempt }
        } else {
            record.status = UrlStatus::Failed;
            FailureOutcome::Final
        }
    }

    fn take_in_flight(&mut self, key: &str) -> Option<&mut UrlRecord> {
        let record = self.records.get_mut(key)?;
        if record.status != UrlStatus::InFlight {
            tracing::warn!("{} settled while {}", key, record.status);
            return None;
        }
        self.in_flight -= 1;
        Some(record)
    }

    /// Whether a URL is inside the job's domains and clear of stop patterns
    pub fn in_scope(&self, url: &Url) -> bool {
        self.scope.check(url).is_ok()
    }

    /// Marks the final URL of a redirect as known
    ///
    /// The redirect target was fetched under another key, so a Pending record
    /// for it is skipped and an unknown one is recorded as Done.
    ///
    /// Returns true when the target was already claimed (in flight, done or
    /// skipped); the page then belongs to that record and must not be
    /// emitted again under the requested key.
    pub fn mark_alias(&mut self, final_url: &Url, requested_key: &str) -> bool {
        match self.records.get_mut(final_url.as_str()) {
            Some(record) => match record.status {
                UrlStatus::Pending => {
                    record.status = UrlStatus::Skipped;
                    false
                }
                UrlStatus::InFlight | UrlStatus::Done | UrlStatus::Skipped => true,
                UrlStatus::Failed => false,
            },
            None => {
                let record = UrlRecord {
                    canonical_url: final_url.clone(),
                    origin: UrlOrigin::Discovered,
                    rank: 0,
                    tags: BTreeSet::from([UrlOrigin::Discovered.tag()]),
                    selectors_key: self.selectors_key.clone(),
                    status: UrlStatus::Done,
                    attempts: 0,
                    last_error: None,
                    found_on: Some(requested_key.to_string()),
                    retry_budget: 0,
                };
                self.records.insert(final_url.to_string(), record);
                false
            }
        }
    }

    /// Applies a saved crawl state
    ///
    /// Visited URLs are skipped. Failed URLs get one more attempt without
    /// retries. Saved pending URLs are offered again.
    pub fn restore(&mut self, state: &CrawlState) -> RestoreSummary {
        let mut summary = RestoreSummary::default();

        for raw in &state.visited_urls {
            let Ok(url) = canonicalize(raw) else { continue };
            match self.records.get_mut(url.as_str()) {
                Some(record) => {
                    if record.status == UrlStatus::Pending {
                        record.status = UrlStatus::Skipped;
                        summary.skipped += 1;
                    }
                }
                None => {
                    let record = UrlRecord {
                        canonical_url: url.clone(),
                        origin: UrlOrigin::Discovered,
                        rank: 0,
                        tags: BTreeSet::new(),
                        selectors_key: self.selectors_key.clone(),
                        status: UrlStatus::Skipped,
                        attempts: 0,
                        last_error: None,
                        found_on: None,
                        retry_budget: 0,
                    };
                    self.records.insert(url.to_string(), record);
                }
            }
        }

        for raw in &state.failed_urls {
            let Ok(url) = canonicalize(raw) else { continue };
            let key = url.to_string();
            match self.records.get_mut(&key) {
                Some(record) if record.status == UrlStatus::Pending => {
                    record.retry_budget = 0;
                    summary.failed_requeued += 1;
                }
                Some(_) => {}
                None => {
                    if self.scope.check(&url).is_ok() {
                        self.insert_pending(url, UrlOrigin::Discovered, 0, BTreeSet::new(), None);
                        if let Some(record) = self.records.get_mut(&key) {
                            record.retry_budget = 0;
                        }
                        summary.failed_requeued += 1;
                    }
                }
            }
        }

        for raw in &state.pending_urls {
            if self.offer(raw, None) == Offer::Added {
                summary.pending_reoffered += 1;
            }
        }

        summary
    }

    /// URLs not yet settled, for the checkpoint
    pub fn pending_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .records
            .values()
            .filter(|r| r.status.is_active())
            .map(|r| r.key().to_string())
            .collect();
        urls.sort();
        urls
    }

    pub fn get(&self, key: &str) -> Option<&UrlRecord> {
        self.records.get(key)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counts(&self) -> FrontierCounts {
        let mut counts = FrontierCounts::default();
        for record in self.records.values() {
            match record.status {
                UrlStatus::Pending => counts.pending += 1,
                UrlStatus::InFlight => counts.in_flight += 1,
                UrlStatus::Done => counts.done += 1,
                UrlStatus::Failed => counts.failed += 1,
                UrlStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}
