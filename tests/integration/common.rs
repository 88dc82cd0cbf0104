use doc_harvester::config::{parse_config, Config};
use serde_json::Value;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a validated configuration around the given `[[jobs]]` tables
pub fn test_config(state_dir: &Path, batch: &str, jobs: &str) -> Config {
    custom_config(state_dir, "max-concurrent = 2\ndelay-ms = 0", "", batch, jobs)
}

/// Like [`test_config`], with extra `[crawler]` and `[state]` keys
pub fn custom_config(state_dir: &Path, crawler: &str, state: &str, batch: &str, jobs: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
max-retries = 2
retry-backoff-ms = 10
timeout-ms = 2000
{}

[user-agent]
name = "TestBot"
version = "1.0.0"

[state]
dir = '{}'
{}

[batch]
{}

{}
"#,
        crawler,
        state_dir.display(),
        state,
        batch,
        jobs
    );
    parse_config(&toml).expect("test config should be valid")
}

/// A `[[jobs]]` table seeded from start URLs
pub fn job_table(id: &str, priority: i32, output: &Path, start_urls: &[String]) -> String {
    let urls: Vec<String> = start_urls.iter().map(|u| format!("\"{}\"", u)).collect();
    format!(
        r#"
[[jobs]]
id = "{}"
priority = {}
output = '{}'
start-urls = [{}]
"#,
        id,
        priority,
        output.display(),
        urls.join(", ")
    )
}

pub fn html(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><main>{}</main></body></html>",
        title, body
    )
}

/// Mounts an HTML page expected to be fetched `times` times
pub async fn mount_page(server: &MockServer, route: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, route: &str, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .expect(times)
        .mount(server)
        .await;
}

/// Reads a JSON Lines output file
pub fn read_records(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is a JSON record"))
        .collect()
}

/// Canonical URLs of the records in an output file, sorted
pub fn record_urls(path: &Path) -> Vec<String> {
    let mut urls: Vec<String> = read_records(path)
        .iter()
        .map(|r| r["url"].as_str().unwrap_or_default().to_string())
        .collect();
    urls.sort();
    urls
}
