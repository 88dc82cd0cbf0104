use serde::Deserialize;

/// Main configuration structure for Doc-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

/// Crawler behavior configuration, shared by every job
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent page fetches per job
    pub max_concurrent: u32,

    /// Minimum time between two fetch starts (milliseconds)
    pub delay_ms: u64,

    /// Whether `delay_ms` is measured per job or across all jobs
    pub delay_scope: DelayScope,

    /// Retries allowed for a retryable page failure
    pub max_retries: u32,

    /// Base of the exponential backoff between retries (milliseconds)
    pub retry_backoff_ms: u64,

    /// Hard per-request timeout (milliseconds)
    pub timeout_ms: u64,

    /// Whether HTTP redirects are followed
    pub follow_redirects: bool,

    /// Redirect hop cap when following redirects
    pub max_redirects: u32,

    /// URL patterns that are never crawled, merged into every job
    pub stop_urls: Vec<StopUrlEntry>,

    /// Domain patterns every job may crawl in addition to its own list
    pub allowed_domains: Vec<String>,

    /// Whether `<xhtml:link rel="alternate">` sitemap entries are seeded
    pub sitemap_alternate_links: bool,

    /// How long in-flight fetches may run after cancellation (milliseconds)
    pub cancel_grace_ms: u64,

    /// Stop issuing fetches after this many successful pages
    pub max_pages: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            delay_ms: 0,
            delay_scope: DelayScope::Job,
            max_retries: 3,
            retry_backoff_ms: 500,
            timeout_ms: 30_000,
            follow_redirects: true,
            max_redirects: 5,
            stop_urls: Vec::new(),
            allowed_domains: Vec::new(),
            sitemap_alternate_links: false,
            cancel_grace_ms: 10_000,
            max_pages: None,
        }
    }
}

/// Scope of the inter-fetch delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayScope {
    /// Time since this job's last fetch start
    Job,
    /// Time since any job's last fetch start
    Global,
}

/// A stop URL pattern as written in the configuration
///
/// A bare string is a substring pattern; a table picks the match kind:
///
/// ```toml
/// stop-urls = ["/changelog", { exact = "https://docs.example.com/404" }, { regex = "\\?page=\\d+" }]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StopUrlEntry {
    Substring(String),
    Typed(TypedStopUrl),
}

/// Explicitly typed stop URL pattern
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypedStopUrl {
    Exact(String),
    Substring(String),
    Regex(String),
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub name: String,

    /// Version of the crawler
    pub version: String,

    /// URL with information about the crawler
    pub contact_url: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: "DocHarvester".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!("{}/{} (+{})", self.name, self.version, contact),
            None => format!("{}/{}", self.name, self.version),
        }
    }
}

/// Checkpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StateConfig {
    /// Directory holding one state file per job
    pub dir: String,

    /// Autosave interval (seconds)
    pub autosave_interval_secs: u64,

    /// Autosave after this many successful pages
    pub autosave_every_pages: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: ".harvest-state".to_string(),
            autosave_interval_secs: 30,
            autosave_every_pages: 10,
        }
    }
}

/// Batch scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BatchConfig {
    /// Maximum number of jobs running at once
    pub max_parallel: u32,

    /// Keep starting queued jobs after a job fails
    pub continue_on_error: bool,

    /// Where the batch results report is written
    pub report_path: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            continue_on_error: true,
            report_path: None,
        }
    }
}

/// One crawl job of the batch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobEntry {
    /// Unique job identifier (also names the state file)
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Higher priorities start first
    #[serde(default)]
    pub priority: i32,

    /// Explicit start pages
    #[serde(default)]
    pub start_urls: Vec<String>,

    /// Sitemaps (or sitemap indexes) to seed from
    #[serde(default)]
    pub sitemap_urls: Vec<String>,

    /// Fallback seed when nothing else resolves
    #[serde(default)]
    pub base_url: Option<String>,

    /// Additional allowed domain patterns for this job
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Additional stop patterns for this job
    #[serde(default)]
    pub stop_urls: Vec<StopUrlEntry>,

    /// CSS selector for the content root handed to the extractor
    #[serde(default)]
    pub selectors: Option<String>,

    /// JSON Lines file receiving the page records
    pub output: String,

    /// Overrides `crawler.max-retries`
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Whether a failure of this job fails the batch
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}
