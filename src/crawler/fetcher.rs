//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with a hard per-request timeout
//! - Manual redirect handling with loop detection and a hop cap
//! - Error classification into retryable and terminal failures

use crate::config::{CrawlerConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the fetch was asked for
    pub requested_url: Url,
    /// URL that finally answered, after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// Redirect hops followed
    pub redirects: u32,
}

/// Why a fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeout, DNS failure, connection reset, truncated body
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status after redirects
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// Redirect loop, hop cap, missing Location, or redirects disabled
    #[error("redirect error: {0}")]
    Redirect(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Network errors, 5xx and 429 are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status } => *status == 429 || (500..=599).contains(status),
            Self::Redirect(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Fetches one URL
///
/// Implementations must be cheap to share between worker tasks.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Request behavior of [`HttpFetcher`]
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: u32,
}

impl FetchSettings {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled on the client; [`HttpFetcher`] follows them itself
/// so every hop can be checked.
///
/// # Example
///
/// ```no_run
/// use doc_harvester::config::UserAgentConfig;
/// use doc_harvester::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`PageFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(user_agent: &UserAgentConfig, settings: FetchSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, settings.timeout)?,
            settings,
        })
    }

    pub fn with_client(client: Client, settings: FetchSettings) -> Self {
        Self { client, settings }
    }

    async fn fetch_following(&self, requested: Url) -> Result<FetchedPage, FetchError> {
        let mut current = requested.clone();
        let mut seen = HashSet::from([current.to_string()]);
        let mut redirects = 0;

        loop {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(classify_reqwest_error)?;
            let status = response.status();

            if status.is_redirection() {
                if !self.settings.follow_redirects {
                    return Err(FetchError::Redirect(format!(
                        "{} answered {} and redirects are disabled",
                        current, status
                    )));
                }

                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        FetchError::Redirect(format!("{} answered {} without Location", current, status))
                    })?;
                let next = current.join(location).map_err(|e| {
                    FetchError::Redirect(format!("bad Location '{}': {}", location, e))
                })?;

                if redirects >= self.settings.max_redirects {
                    return Err(FetchError::Redirect(format!(
                        "more than {} redirects from {}",
                        self.settings.max_redirects, requested
                    )));
                }
                if !seen.insert(next.to_string()) {
                    return Err(FetchError::Redirect(format!("redirect loop at {}", next)));
                }

                tracing::debug!("{} redirected to {}", current, next);
                redirects += 1;
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.map_err(classify_reqwest_error)?;

            return Ok(FetchedPage {
                requested_url: requested,
                final_url: current,
                status: status.as_u16(),
                content_type,
                body,
                redirects,
            });
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let requested = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        // The hard timeout covers the whole redirect chain and the body
        match tokio::time::timeout(self.settings.timeout, self.fetch_following(requested)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Network(format!(
                "request timed out after {}ms",
                self.settings.timeout.as_millis()
            ))),
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network("request timed out".to_string())
    } else if e.is_connect() {
        FetchError::Network(format!("connection failed: {}", e))
    } else {
        FetchError::Network(e.to_string())
    }
}
