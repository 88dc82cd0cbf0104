//! Batch results report
//!
//! The report is appended to by a single writer task fed through an mpsc
//! channel; jobs never touch it directly. After every append the report file
//! (if configured) is rewritten atomically.

use crate::job::{JobResult, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Results of a batch, in job completion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "configHash", default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub jobs: Vec<JobResult>,
}

impl BatchReport {
    pub fn new(total: usize, config_hash: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            config_hash,
            total,
            completed: 0,
            failed: 0,
            cancelled: 0,
            jobs: Vec::with_capacity(total),
        }
    }

    pub fn append(&mut self, result: JobResult) {
        match result.status {
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
            JobStatus::Queued | JobStatus::Running => {
                tracing::warn!("Job {} reported non-terminal status {}", result.id, result.status);
            }
        }
        self.jobs.push(result);
    }

    pub fn job(&self, id: &str) -> Option<&JobResult> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Writes the report as pretty JSON via a temporary file
    pub async fn write(&self, path: &Path) -> io::Result<()> {
        let encoded = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

/// Spawns the single writer of a batch report
///
/// Returns the sender jobs' results go through and the task that yields the
/// final report once every sender is dropped.
pub fn spawn_report_writer(
    mut report: BatchReport,
    path: Option<PathBuf>,
) -> (mpsc::UnboundedSender<JobResult>, JoinHandle<BatchReport>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<JobResult>();

    let task = tokio::spawn(async move {
        while let Some(result) = rx.recv().await {
            tracing::debug!("Report: job {} {}", result.id, result.status);
            report.append(result);
            if let Some(path) = &path {
                if let Err(e) = report.write(path).await {
                    tracing::error!("Failed to write batch report {}: {}", path.display(), e);
                }
            }
        }
        report
    });

    (tx, task)
}

/// Prints a batch report to stdout in a formatted manner
pub fn print_report(report: &BatchReport) {
    println!("=== Batch Results ===\n");

    println!("Overview:");
    println!("  Jobs: {}", report.total);
    println!("  Completed: {}", report.completed);
    println!("  Failed: {}", report.failed);
    println!("  Cancelled: {}", report.cancelled);
    println!();

    println!("Jobs (in completion order):");
    for job in &report.jobs {
        match &job.stats {
            Some(stats) => println!(
                "  {:<24} {:<10} {:>6} pages {:>5} errors {:>8.1}s",
                job.id, job.status, stats.pages, stats.errors, stats.duration
            ),
            None => println!("  {:<24} {:<10}", job.id, job.status),
        }
        if let Some(error) = &job.error {
            println!("      {}", error);
        }
    }
    println!();

    let pages: u64 = report.jobs.iter().filter_map(|j| j.stats).map(|s| s.pages).sum();
    println!("Total pages crawled: {}", pages);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(id: &str, status: JobStatus) -> JobResult {
        JobResult {
            id: id.to_string(),
            status,
            stats: None,
            error: None,
            start_time: Some(Utc::now()),
            end_time: Utc::now(),
        }
    }

    #[test]
    fn test_append_counts() {
        let mut report = BatchReport::new(3, None);
        report.append(result("a", JobStatus::Completed));
        report.append(result("b", JobStatus::Failed));
        report.append(result("c", JobStatus::Cancelled));

        assert_eq!((report.completed, report.failed, report.cancelled), (1, 1, 1));
        assert_eq!(report.jobs.len(), 3);
        assert_eq!(report.job("b").unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_schema() {
        let mut report = BatchReport::new(1, Some("abc123".to_string()));
        report.append(result("a", JobStatus::Completed));
        let json = serde_json::to_value(&report).unwrap();

        for key in ["timestamp", "total", "completed", "failed", "cancelled", "jobs", "configHash"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["jobs"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn test_writer_persists_after_every_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/batch.json");
        let (tx, task) = spawn_report_writer(BatchReport::new(2, None), Some(path.clone()));

        tx.send(result("first", JobStatus::Completed)).unwrap();
        tx.send(result("second", JobStatus::Failed)).unwrap();
        drop(tx);

        let report = task.await.unwrap();
        assert_eq!(report.jobs.len(), 2);

        let on_disk: BatchReport =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk, report);
        assert!(!dir.path().join("reports/batch.json.tmp").exists());
    }
}
