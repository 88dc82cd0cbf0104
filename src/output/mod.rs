//! Output module for page records
//!
//! This module handles:
//! - The `OutputSink` contract crawl jobs write page records to
//! - A JSON Lines sink for the command line
//! - An in-memory sink for embedding

mod jsonl;
mod memory;
mod traits;

pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;
pub use traits::{OutputSink, PageRecord, SinkError, SinkResult};
