//! Batch layer
//!
//! Runs the configured jobs in priority order with at most `max-parallel` of
//! them at once, collects every terminal [`crate::job::JobResult`] into a
//! [`BatchReport`] and decides the batch's overall status.

mod report;
mod scheduler;

pub use report::{print_report, spawn_report_writer, BatchReport};
pub use scheduler::{BatchHandle, BatchOutcome, BatchScheduler, BatchSettings, BatchStatus};
