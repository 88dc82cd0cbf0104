//! Output sink trait and page records
//!
//! A sink receives one [`PageRecord`] per successfully extracted page. Sink
//! failures are logged and counted by the crawl; they are never retried.

use crate::crawler::{CodeBlock, UrlOrigin};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while writing page records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize page record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Sink rejected record: {0}")]
    Rejected(String),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// One extracted page, as handed to downstream converters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub job_id: String,

    /// Canonical URL the page was requested under
    pub url: String,

    /// URL that answered, after redirects
    pub final_url: String,

    pub title: Option<String>,
    pub content: String,
    pub links: Vec<String>,
    pub code_blocks: Vec<CodeBlock>,

    pub origin: UrlOrigin,
    pub rank: i32,
    pub tags: Vec<String>,
    pub selectors_key: Option<String>,

    pub status_code: u16,
    pub fetched_at: DateTime<Utc>,
}

/// Receives page records from a crawl job
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Accepts one record
    async fn accept(&self, record: &PageRecord) -> SinkResult<()>;

    /// Flushes anything buffered; called once when the job ends
    async fn finish(&self) -> SinkResult<()> {
        Ok(())
    }
}
