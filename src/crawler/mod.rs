//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The per-job URL frontier with rank ordering and retry state
//! - Sitemap discovery
//! - HTTP fetching with manual redirect handling
//! - HTML extraction of titles, text, links and code blocks
//! - Rate limiting and retry backoff
//! - The bounded-concurrency executor loop

mod executor;
mod extractor;
mod fetcher;
mod frontier;
mod sitemap;
mod throttle;

pub use executor::{ExecutorReport, ExecutorSettings, FetchExecutor, JobControl, PageError};
pub use extractor::{CodeBlock, ExtractError, Extracted, Extractor, HtmlExtractor};
pub use fetcher::{build_http_client, FetchError, FetchSettings, FetchedPage, HttpFetcher, PageFetcher};
pub use frontier::{
    rank_from_priority, DiscoveryError, FailureOutcome, Frontier, FrontierCounts, NextUrl, Offer,
    RestoreSummary, UrlOrigin, UrlRecord,
};
pub use sitemap::{
    discover_sitemaps, parse_sitemap, ParsedSitemap, SitemapDiscovery, SitemapEntry, SitemapError,
    MAX_SITEMAPS, MAX_SITEMAP_DEPTH,
};
pub use throttle::{Backoff, RateLimiter, MAX_BACKOFF};
