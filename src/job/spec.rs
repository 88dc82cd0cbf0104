use crate::config::{Config, CrawlerConfig, JobEntry, StopUrlEntry};
use crate::scope::{CrawlScope, StopList};
use crate::ConfigResult;
use std::path::PathBuf;
use url::Url;

/// Where a job's seeds come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlSource {
    pub start_urls: Vec<String>,
    pub sitemap_urls: Vec<String>,
    pub base_url: Option<String>,
}

impl UrlSource {
    /// Lowercased hosts of every configured URL, deduplicated
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .start_urls
            .iter()
            .chain(self.sitemap_urls.iter())
            .chain(self.base_url.iter())
            .filter_map(|u| Url::parse(u).ok())
            .filter_map(|u| u.host_str().map(str::to_lowercase))
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

/// One crawl job as scheduled by the batch
///
/// Built once from the configuration and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub name: String,
    /// Higher starts first
    pub priority: i32,
    pub max_retries: u32,
    pub url_source: UrlSource,
    /// JSON Lines file receiving page records
    pub output: PathBuf,
    /// Global patterns plus the job's own (or its seed hosts)
    pub allowed_domains: Vec<String>,
    /// Global patterns plus the job's own
    pub stop_urls: Vec<StopUrlEntry>,
    pub selectors_key: Option<String>,
    /// A failure of a required job can stop the batch
    pub required: bool,
}

impl JobSpec {
    /// Builds a job from its configuration entry
    ///
    /// When the job lists no allowed domains, the hosts of its start,
    /// sitemap and base URLs are allowed.
    pub fn from_entry(entry: &JobEntry, crawler: &CrawlerConfig) -> Self {
        let url_source = UrlSource {
            start_urls: entry.start_urls.clone(),
            sitemap_urls: entry.sitemap_urls.clone(),
            base_url: entry.base_url.clone(),
        };

        let mut allowed_domains = crawler.allowed_domains.clone();
        if entry.allowed_domains.is_empty() {
            allowed_domains.extend(url_source.hosts());
        } else {
            allowed_domains.extend(entry.allowed_domains.iter().cloned());
        }
        allowed_domains.sort();
        allowed_domains.dedup();

        let stop_urls = crawler
            .stop_urls
            .iter()
            .chain(entry.stop_urls.iter())
            .cloned()
            .collect();

        Self {
            id: entry.id.clone(),
            name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
            priority: entry.priority,
            max_retries: entry.max_retries.unwrap_or(crawler.max_retries),
            url_source,
            output: PathBuf::from(&entry.output),
            allowed_domains,
            stop_urls,
            selectors_key: entry.selectors.clone(),
            required: entry.required,
        }
    }

    /// Compiles the job's crawl scope
    pub fn scope(&self) -> ConfigResult<CrawlScope> {
        let stops = StopList::compile(&self.stop_urls)?;
        Ok(CrawlScope::new(self.allowed_domains.clone(), stops))
    }
}

/// All jobs of a configuration, in configuration order
pub fn job_specs(config: &Config) -> Vec<JobSpec> {
    config
        .jobs
        .iter()
        .map(|entry| JobSpec::from_entry(entry, &config.crawler))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[crawler]
max-retries = 4
allowed-domains = ["cdn.example.com"]
stop-urls = ["/changelog"]

[[jobs]]
id = "guide"
start-urls = ["https://Docs.example.com/guide"]
sitemap-urls = ["https://docs.example.com/sitemap.xml"]
output = "out/guide.jsonl"

[[jobs]]
id = "api"
name = "API reference"
priority = 10
base-url = "https://api.example.com/"
allowed-domains = ["*.example.org"]
stop-urls = [{ regex = "\\?version=" }]
selectors = "main .content"
max-retries = 1
required = false
output = "out/api.jsonl"
"#;

    fn specs() -> Vec<JobSpec> {
        job_specs(&parse_config(CONFIG).unwrap())
    }

    #[test]
    fn test_defaults_from_crawler_config() {
        let guide = &specs()[0];
        assert_eq!(guide.name, "guide");
        assert_eq!(guide.priority, 0);
        assert_eq!(guide.max_retries, 4);
        assert!(guide.required);
        assert_eq!(guide.output, PathBuf::from("out/guide.jsonl"));
    }

    #[test]
    fn test_allowed_domains_default_to_seed_hosts() {
        assert_eq!(
            specs()[0].allowed_domains,
            vec!["cdn.example.com", "docs.example.com"]
        );
    }

    #[test]
    fn test_explicit_overrides() {
        let api = &specs()[1];
        assert_eq!(api.name, "API reference");
        assert_eq!(api.priority, 10);
        assert_eq!(api.max_retries, 1);
        assert!(!api.required);
        assert_eq!(api.selectors_key.as_deref(), Some("main .content"));
        assert_eq!(api.allowed_domains, vec!["*.example.org", "cdn.example.com"]);
        assert_eq!(api.stop_urls.len(), 2);
    }

    #[test]
    fn test_scope_applies_stops() {
        let scope = specs()[0].scope().unwrap();
        let stopped = Url::parse("https://docs.example.com/changelog").unwrap();
        let allowed = Url::parse("https://docs.example.com/guide").unwrap();
        assert!(scope.check(&stopped).is_err());
        assert!(scope.check(&allowed).is_ok());
    }
}
