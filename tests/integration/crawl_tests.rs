//! End-to-end crawl tests for single jobs

use crate::common::{
    custom_config, html, job_table, mount_page, mount_status, read_records, record_urls, test_config,
};
use doc_harvester::batch::{BatchOutcome, BatchScheduler, BatchSettings, BatchStatus};
use doc_harvester::config::Config;
use doc_harvester::crawler::{FetchSettings, HtmlExtractor, HttpFetcher};
use doc_harvester::events::{CrawlEvent, EventBus};
use doc_harvester::job::{job_specs, CrawlJobRunner, ResumeMode, StateLocation};
use doc_harvester::state::{CrawlState, StateStore};
use doc_harvester::JobStatus;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Runs every job of the config through the real runner
pub async fn run_batch(config: &Config, state: StateLocation, mode: ResumeMode) -> BatchOutcome {
    scheduler(config, state, mode, EventBus::default()).run().await
}

fn scheduler(config: &Config, state: StateLocation, mode: ResumeMode, events: EventBus) -> BatchScheduler {
    let fetcher = HttpFetcher::new(&config.user_agent, FetchSettings::from_config(&config.crawler))
        .expect("Failed to build fetcher");
    let runner = CrawlJobRunner::new(
        config,
        state,
        mode,
        Arc::new(fetcher),
        Arc::new(HtmlExtractor),
        events.clone(),
    );
    BatchScheduler::new(
        BatchSettings::from_config(config, None),
        job_specs(config),
        Arc::new(runner),
        events,
    )
}

fn state_dir(dir: &TempDir) -> StateLocation {
    StateLocation::Dir(dir.path().join("state"))
}

fn urls(base: &str, routes: &[&str]) -> Vec<String> {
    routes.iter().map(|r| format!("{}{}", base, r)).collect()
}

#[tokio::test]
async fn test_three_seeds_all_succeed() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");

    for (route, title) in [("/a", "A"), ("/b", "B"), ("/c", "C")] {
        mount_page(&server, route, html(title, "<p>text</p>"), 1).await;
    }

    let seeds = urls(&server.uri(), &["/a", "/b", "/c"]);
    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &seeds),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    let job = outcome.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let stats = job.stats.unwrap();
    assert_eq!(stats.pages, 3);
    assert_eq!(stats.errors, 0);
    assert_eq!(outcome.status, BatchStatus::Completed);

    assert_eq!(record_urls(&output), seeds);

    let state = StateStore::for_job(&dir.path().join("state"), "docs")
        .load()
        .unwrap()
        .expect("state file written at job end");
    assert_eq!(state.visited_urls.len(), 3);
    assert_eq!(state.statistics.successful_pages, 3);
    assert!(state.pending_urls.is_empty());
}

#[tokio::test]
async fn test_not_found_page_counts_as_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");

    mount_page(&server, "/a", html("A", "ok"), 1).await;
    mount_status(&server, "/missing", 404, 1).await;
    mount_page(&server, "/c", html("C", "ok"), 1).await;

    let seeds = urls(&server.uri(), &["/a", "/missing", "/c"]);
    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &seeds),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    let job = outcome.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stats.unwrap().pages, 2);
    assert_eq!(job.stats.unwrap().errors, 1);
    assert_eq!(record_urls(&output).len(), 2);

    let state = StateStore::for_job(&dir.path().join("state"), "docs")
        .load()
        .unwrap()
        .unwrap();
    assert!(state.is_failed(&format!("{}/missing", server.uri())));
    assert_eq!(state.statistics.total_pages, 3);
}

#[tokio::test]
async fn test_links_are_followed_within_domain() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");

    let index = html(
        "Index",
        r#"<a href="/guide">Guide</a> <a href="https://elsewhere.example/x">Off-site</a>"#,
    );
    mount_page(&server, "/", index, 1).await;
    mount_page(&server, "/guide", html("Guide", r#"<a href="/">Home</a>"#), 1).await;

    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &[format!("{}/", server.uri())]),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    assert_eq!(outcome.report.job("docs").unwrap().stats.unwrap().pages, 2);
    let records = read_records(&output);
    let guide = records
        .iter()
        .find(|r| r["title"] == "Guide")
        .expect("linked page crawled");
    assert_eq!(guide["origin"], "discovered");
}

#[tokio::test]
async fn test_resume_skips_visited_urls() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");
    let routes = ["/p1", "/p2", "/p3", "/p4", "/p5"];
    let seeds = urls(&server.uri(), &routes);

    // Already crawled by the interrupted run
    for route in &routes[..2] {
        mount_page(&server, route, html(route, "old"), 0).await;
    }
    for route in &routes[2..] {
        mount_page(&server, route, html(route, "new"), 1).await;
    }

    let store = StateStore::for_job(&dir.path().join("state"), "docs");
    let mut state = CrawlState::new();
    state.record_success(&seeds[0]);
    state.record_success(&seeds[1]);
    store.snapshot(&mut state).await.unwrap();

    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &seeds),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Resume).await;

    let job = outcome.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stats.unwrap().pages, 3);

    let state = store.load().unwrap().unwrap();
    assert_eq!(state.visited_urls.len(), 5);
    assert_eq!(state.statistics.successful_pages, 5);
}

#[tokio::test]
async fn test_resume_with_everything_visited_fetches_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");
    let seeds = urls(&server.uri(), &["/a", "/b"]);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state_file = dir.path().join("saved.state.json");
    let store = StateStore::new(&state_file);
    let mut state = CrawlState::new();
    for seed in &seeds {
        state.record_success(seed);
    }
    store.snapshot(&mut state).await.unwrap();

    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &seeds),
    );
    let outcome = run_batch(&config, StateLocation::File(state_file), ResumeMode::Resume).await;

    let job = outcome.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stats.unwrap().pages, 0);
}

#[tokio::test]
async fn test_reset_discards_saved_state() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");
    let seeds = urls(&server.uri(), &["/a"]);

    mount_page(&server, "/a", html("A", "again"), 1).await;

    let store = StateStore::for_job(&dir.path().join("state"), "docs");
    let mut state = CrawlState::new();
    state.record_success(&seeds[0]);
    store.snapshot(&mut state).await.unwrap();

    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &seeds),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Reset).await;

    assert_eq!(outcome.report.job("docs").unwrap().stats.unwrap().pages, 1);
}

#[tokio::test]
async fn test_sitemap_seeding() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");
    let base = server.uri();

    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/intro</loc><priority>0.9</priority></url>
  <url><loc>{base}/api</loc></url>
</urlset>"#
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/intro", html("Intro", "hello"), 1).await;
    mount_page(&server, "/api", html("API", "reference"), 1).await;

    let jobs = format!(
        r#"
[[jobs]]
id = "docs"
output = '{}'
sitemap-urls = ["{}/sitemap.xml"]
"#,
        output.display(),
        base
    );
    let config = test_config(&dir.path().join("state"), "", &jobs);
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    assert_eq!(outcome.report.job("docs").unwrap().status, JobStatus::Completed);
    let records = read_records(&output);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["origin"] == "sitemap"));
    let intro = records.iter().find(|r| r["title"] == "Intro").unwrap();
    assert_eq!(intro["rank"], 9);
}

#[tokio::test]
async fn test_redirect_recorded_under_final_url() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/new", html("New", "moved here"), 1).await;

    let seeds = urls(&server.uri(), &["/old", "/new"]);
    let config = test_config(
        &dir.path().join("state"),
        "max-parallel = 1",
        &job_table("docs", 0, &output, &seeds[..1]),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    assert_eq!(outcome.report.job("docs").unwrap().stats.unwrap().pages, 1);
    let records = read_records(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["final_url"], seeds[1].as_str());
}

#[tokio::test]
async fn test_redirect_onto_seed_emits_one_record() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/new", html("New", "moved here"), 1).await;

    // /new is claimed by its own fetch before or while /old redirects onto it
    let seeds = urls(&server.uri(), &["/new", "/old"]);
    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &seeds),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    let job = outcome.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stats.unwrap().pages, 1);
    let records = read_records(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["final_url"], seeds[0].as_str());

    let state = StateStore::for_job(&dir.path().join("state"), "docs")
        .load()
        .unwrap()
        .unwrap();
    assert!(state.is_visited(&seeds[0]));
    assert!(state.is_visited(&seeds[1]));
}

#[tokio::test]
async fn test_redirect_off_domain_is_a_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");

    // Same server under a host name the job does not allow
    let port = server.address().port();
    let elsewhere = format!("http://localhost:{}/elsewhere", port);
    Mock::given(method("GET"))
        .and(path("/away"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", elsewhere.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html("Elsewhere", "not ours"), "text/html"))
        .mount(&server)
        .await;

    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &urls(&server.uri(), &["/away"])),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    let job = outcome.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(read_records(&output).is_empty());

    let state = StateStore::for_job(&dir.path().join("state"), "docs")
        .load()
        .unwrap()
        .unwrap();
    assert!(state.is_failed(&format!("{}/away", server.uri())));
    assert!(!state.is_visited(&elsewhere));
}

#[tokio::test]
async fn test_interrupted_crawl_resumes_where_it_stopped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");
    let routes = ["/p1", "/p2", "/p3", "/p4", "/p5"];
    let seeds = urls(&server.uri(), &routes);

    // Each page is fetched once across both runs
    for route in routes {
        mount_page(&server, route, html(route, "text"), 1).await;
    }

    // One fetch at a time, spaced so the cancel lands while /p3 waits
    let config = custom_config(
        &dir.path().join("state"),
        "max-concurrent = 1\ndelay-ms = 300\ncancel-grace-ms = 100",
        "autosave-every-pages = 2",
        "",
        &job_table("docs", 0, &output, &seeds),
    );

    let events = EventBus::default();
    let mut rx = events.subscribe();
    let first = scheduler(&config, state_dir(&dir), ResumeMode::Fresh, events);
    let handle = first.cancel_handle();
    let interrupt = async {
        let mut crawled = 0;
        while crawled < 2 {
            if let CrawlEvent::PageCrawled { .. } = rx.recv().await.unwrap() {
                crawled += 1;
            }
        }
        handle.cancel();
    };
    let (interrupted, ()) = tokio::join!(first.run(), interrupt);

    assert_eq!(interrupted.status, BatchStatus::Cancelled);
    assert_eq!(interrupted.exit_code(), 130);
    assert_eq!(interrupted.report.job("docs").unwrap().status, JobStatus::Cancelled);

    let store = StateStore::for_job(&dir.path().join("state"), "docs");
    let saved = store.load().unwrap().expect("state saved on cancel");
    assert_eq!(saved.visited_urls.len(), 2);
    assert!(saved.is_visited(&seeds[0]));
    assert!(saved.is_visited(&seeds[1]));
    assert!(saved.pending_urls.contains(&seeds[2]));
    assert_eq!(read_records(&output).len(), 2);

    let resumed = run_batch(&config, state_dir(&dir), ResumeMode::Resume).await;

    let job = resumed.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stats.unwrap().pages, 3);
    assert_eq!(resumed.status, BatchStatus::Completed);

    let state = store.load().unwrap().unwrap();
    assert_eq!(state.visited_urls.len(), 5);
    assert!(state.pending_urls.is_empty());
    assert_eq!(record_urls(&output), seeds);
}

#[tokio::test]
async fn test_retries_exhausted_fail_the_job() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("docs.jsonl");

    // One attempt plus max-retries = 2
    mount_status(&server, "/flaky", 503, 3).await;

    let config = test_config(
        &dir.path().join("state"),
        "",
        &job_table("docs", 0, &output, &urls(&server.uri(), &["/flaky"])),
    );
    let outcome = run_batch(&config, state_dir(&dir), ResumeMode::Fresh).await;

    let job = outcome.report.job("docs").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("all 1 pages failed"));
    assert!(Path::new(&output).exists());
    assert!(read_records(&output).is_empty());
}
