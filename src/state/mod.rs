//! State module for tracking crawl progress
//!
//! This module provides the per-URL status machine and the durable per-job
//! crawl state used for checkpoint and resume.
//!
//! # Components
//!
//! - `UrlStatus`: Tracks the state of individual URLs (pending, in flight, done, ...)
//! - `CrawlState`: Visited/failed URL sets and page counters of one job
//! - `StateStore`: Atomic JSON persistence of a `CrawlState`
//! - `Checkpointer`: Applies the autosave policy on top of a store

mod crawl_state;
mod store;
mod url_status;

// Re-export main types
pub use crawl_state::{CrawlState, CrawlStatistics};
pub use store::{AutosavePolicy, Checkpointer, StateError, StateResult, StateStore};
pub use url_status::UrlStatus;
