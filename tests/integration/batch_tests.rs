//! Batch scheduling tests against real jobs

use crate::common::{html, job_table, mount_page, mount_status, test_config};
use crate::crawl_tests::run_batch;
use doc_harvester::batch::{BatchReport, BatchStatus};
use doc_harvester::job::{ResumeMode, StateLocation};
use doc_harvester::JobStatus;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_jobs_start_in_priority_order() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for route in ["/a", "/b", "/c"] {
        mount_page(&server, route, html(route, "text"), 1).await;
    }

    let base = server.uri();
    let jobs = [
        job_table("first-five", 5, &dir.path().join("a.jsonl"), &[format!("{}/a", base)]),
        job_table("ten", 10, &dir.path().join("b.jsonl"), &[format!("{}/b", base)]),
        job_table("second-five", 5, &dir.path().join("c.jsonl"), &[format!("{}/c", base)]),
    ]
    .concat();
    let config = test_config(&dir.path().join("state"), "max-parallel = 1", &jobs);

    let outcome = run_batch(
        &config,
        StateLocation::Dir(dir.path().join("state")),
        ResumeMode::Fresh,
    )
    .await;

    // One job at a time, so completion order is start order
    let order: Vec<&str> = outcome.report.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(order, vec!["ten", "first-five", "second-five"]);
    assert_eq!(outcome.peak_parallel, 1);
    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn test_required_failure_stops_queued_jobs() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    mount_status(&server, "/broken", 404, 1).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html("Slow", "eventually"), "text/html")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/later", html("Later", "never"), 0).await;

    let jobs = [
        job_table("broken", 10, &dir.path().join("broken.jsonl"), &[format!("{}/broken", base)]),
        job_table("slow", 5, &dir.path().join("slow.jsonl"), &[format!("{}/slow", base)]),
        job_table("later", 1, &dir.path().join("later.jsonl"), &[format!("{}/later", base)]),
    ]
    .concat();
    let report_path = dir.path().join("report.json");
    let batch = format!(
        "max-parallel = 2\ncontinue-on-error = false\nreport-path = '{}'",
        report_path.display()
    );
    let config = test_config(&dir.path().join("state"), &batch, &jobs);

    let outcome = run_batch(
        &config,
        StateLocation::Dir(dir.path().join("state")),
        ResumeMode::Fresh,
    )
    .await;

    let report = &outcome.report;
    assert_eq!(report.job("broken").unwrap().status, JobStatus::Failed);
    assert_eq!(report.job("slow").unwrap().status, JobStatus::Completed);
    let later = report.job("later").unwrap();
    assert_eq!(later.status, JobStatus::Cancelled);
    assert!(later.start_time.is_none());

    assert_eq!(outcome.status, BatchStatus::Failed);
    assert_ne!(outcome.exit_code(), 0);

    let on_disk: BatchReport =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(on_disk.total, 3);
    assert_eq!((on_disk.completed, on_disk.failed, on_disk.cancelled), (1, 1, 1));
}

#[tokio::test]
async fn test_continue_on_error_runs_everything() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    mount_status(&server, "/broken", 404, 1).await;
    mount_page(&server, "/fine", html("Fine", "ok"), 1).await;

    let jobs = [
        job_table("broken", 10, &dir.path().join("broken.jsonl"), &[format!("{}/broken", base)]),
        job_table("fine", 0, &dir.path().join("fine.jsonl"), &[format!("{}/fine", base)]),
    ]
    .concat();
    let config = test_config(&dir.path().join("state"), "continue-on-error = true", &jobs);

    let outcome = run_batch(
        &config,
        StateLocation::Dir(dir.path().join("state")),
        ResumeMode::Fresh,
    )
    .await;

    assert_eq!(outcome.report.completed, 1);
    assert_eq!(outcome.report.failed, 1);
    assert_eq!(outcome.status, BatchStatus::CompletedWithErrors);
    assert_eq!(outcome.exit_code(), 0);
}
