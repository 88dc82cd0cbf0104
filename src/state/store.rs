//! Crawl state persistence
//!
//! One JSON file per job. Writes go to a temporary sibling file that is then
//! renamed over the real one, so a crash mid-write never truncates the last
//! good checkpoint.

use crate::state::CrawlState;
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur while loading or writing crawl state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to load state from {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Failed to write state to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;

/// File-backed store for one job's crawl state
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for a job inside a state directory
    pub fn for_job(dir: &Path, job_id: &str) -> Self {
        Self::new(dir.join(format!("{}.state.json", job_id)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the stored state
    ///
    /// # Returns
    ///
    /// * `Ok(Some(CrawlState))` - A valid state was found
    /// * `Ok(None)` - No state file exists
    /// * `Err(StateError::Load)` - The file is unreadable or not a valid state
    pub fn load(&self) -> StateResult<Option<CrawlState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::Load {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };

        let mut state: CrawlState =
            serde_json::from_str(&content).map_err(|e| StateError::Load {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        if state.recount() {
            tracing::warn!(
                "State file {} had inconsistent statistics, recomputed from URL sets",
                self.path.display()
            );
        }

        Ok(Some(state))
    }

    /// Loads the stored state, falling back to a fresh one
    ///
    /// A corrupt file is not fatal: it is logged and the crawl starts over.
    pub fn load_or_fresh(&self) -> CrawlState {
        match self.load() {
            Ok(Some(state)) => {
                tracing::info!(
                    "Loaded state from {}: {} visited, {} failed",
                    self.path.display(),
                    state.visited_urls.len(),
                    state.failed_urls.len()
                );
                state
            }
            Ok(None) => {
                tracing::debug!("No state at {}, starting fresh", self.path.display());
                CrawlState::new()
            }
            Err(e) => {
                tracing::warn!("{}; starting fresh", e);
                CrawlState::new()
            }
        }
    }

    /// Writes a snapshot of the state atomically
    pub async fn snapshot(&self, state: &mut CrawlState) -> StateResult<()> {
        state.saved_at = Some(Utc::now());
        let encoded = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.write_error(source))?;
        }

        let tmp_path = self.tmp_path();
        tokio::fs::write(&tmp_path, encoded)
            .await
            .map_err(|source| self.write_error(source))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| self.write_error(source))?;

        tracing::debug!("State saved to {}", self.path.display());
        Ok(())
    }

    /// Deletes the stored state
    pub fn reset(&self) -> StateResult<()> {
        for path in [self.path.clone(), self.tmp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed state file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StateError::Write { path, source }),
            }
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_error(&self, source: io::Error) -> StateError {
        StateError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// When the checkpointer writes a snapshot
#[derive(Debug, Clone, Copy)]
pub struct AutosavePolicy {
    /// Save at least this often
    pub interval: Duration,
    /// Save after this many successful pages
    pub every_pages: u64,
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            every_pages: 10,
        }
    }
}

/// Owns a job's crawl state and saves it on the autosave schedule
pub struct Checkpointer {
    store: StateStore,
    state: CrawlState,
    policy: AutosavePolicy,
    last_save: Instant,
    pages_since_save: u64,
    dirty: bool,
    saves: u64,
    write_failures: u64,
}

impl Checkpointer {
    pub fn new(store: StateStore, state: CrawlState, policy: AutosavePolicy) -> Self {
        Self {
            store,
            state,
            policy,
            last_save: Instant::now(),
            pages_since_save: 0,
            dirty: false,
            saves: 0,
            write_failures: 0,
        }
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn policy(&self) -> AutosavePolicy {
        self.policy
    }

    pub fn record_success(&mut self, url: &str) {
        self.state.record_success(url);
        self.pages_since_save += 1;
        self.dirty = true;
    }

    pub fn record_failure(&mut self, url: &str) {
        self.state.record_failure(url);
        self.dirty = true;
    }

    /// Marks a URL covered by another page (a redirect alias) as visited
    ///
    /// Unlike [`Checkpointer::record_success`] this does not count towards
    /// the page-based autosave trigger.
    pub fn record_alias(&mut self, url: &str) {
        if !self.state.is_visited(url) {
            self.state.record_success(url);
            self.dirty = true;
        }
    }

    /// Returns true if a snapshot is due at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.dirty
            && (self.pages_since_save >= self.policy.every_pages
                || now.duration_since(self.last_save) >= self.policy.interval)
    }

    /// Saves if the autosave policy says so
    ///
    /// `pending` is only called when a save actually happens. Returns true if
    /// a snapshot was written.
    pub async fn save_if_due(&mut self, pending: impl FnOnce() -> Vec<String>) -> bool {
        if !self.is_due(Instant::now()) {
            return false;
        }
        self.save(pending()).await.is_ok()
    }

    /// Saves unconditionally
    ///
    /// A write failure is logged and counted; the in-memory state is kept so
    /// the next save can try again.
    pub async fn save(&mut self, pending: Vec<String>) -> StateResult<()> {
        self.state.pending_urls = pending;
        match self.store.snapshot(&mut self.state).await {
            Ok(()) => {
                self.last_save = Instant::now();
                self.pages_since_save = 0;
                self.dirty = false;
                self.saves += 1;
                Ok(())
            }
            Err(e) => {
                self.write_failures += 1;
                tracing::error!("Checkpoint failed, continuing without it: {}", e);
                Err(e)
            }
        }
    }

    pub fn saves(&self) -> u64 {
        self.saves
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn into_state(self) -> CrawlState {
        self.state
    }
}
