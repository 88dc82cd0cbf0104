use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a job inside a batch
///
/// Queued → Running → {Completed | Failed | Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of a finished job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    /// Pages crawled successfully in this run
    pub pages: u64,
    /// Wall-clock run time in seconds
    pub duration: f64,
    /// Pages that failed for good plus output sink errors
    pub errors: u64,
}

/// Terminal outcome of one job, created exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<JobStats>,
    /// One-line summary of what went wrong
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// None when the job never started
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
}

impl JobResult {
    /// A job that failed before or while running
    pub fn failed(id: &str, start_time: Option<DateTime<Utc>>, error: impl fmt::Display) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatus::Failed,
            stats: None,
            error: Some(error.to_string()),
            start_time,
            end_time: Utc::now(),
        }
    }

    /// A queued job cancelled before it started
    pub fn cancelled_before_start(id: &str, reason: impl fmt::Display) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatus::Cancelled,
            stats: None,
            error: Some(reason.to_string()),
            start_time: None,
            end_time: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_report_schema() {
        let result = JobResult {
            id: "guide".to_string(),
            status: JobStatus::Completed,
            stats: Some(JobStats {
                pages: 3,
                duration: 1.5,
                errors: 0,
            }),
            error: None,
            start_time: Some(Utc::now()),
            end_time: Utc::now(),
        };
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["id"], "guide");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["stats"]["pages"], 3);
        assert!(json.get("error").is_none());
        assert!(json["startTime"].is_string());
        assert!(json["endTime"].is_string());
    }

    #[test]
    fn test_cancelled_before_start() {
        let result = JobResult::cancelled_before_start("api", "batch stopped");
        assert_eq!(result.status, JobStatus::Cancelled);
        assert!(result.start_time.is_none());
        assert!(result.stats.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert!(json["startTime"].is_null());
        assert_eq!(json["error"], "batch stopped");
    }
}
