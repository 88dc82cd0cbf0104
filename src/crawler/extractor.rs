//! Page extraction
//!
//! Turns a fetched page into a title, text content, links to follow and code
//! blocks. [`HtmlExtractor`] is the scraper-based default; richer converters
//! plug in through the [`Extractor`] trait.

use crate::crawler::fetcher::FetchedPage;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// A code sample found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

/// What an extractor found on a page
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub title: Option<String>,
    pub content: String,
    /// Absolute http(s) URLs, in document order, without duplicates
    pub links: Vec<String>,
    pub code_blocks: Vec<CodeBlock>,
}

/// Extraction failures; always terminal for the page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("unsupported content type '{0}'")]
    UnsupportedContent(String),

    #[error("invalid content selector '{0}'")]
    InvalidSelector(String),

    #[error("content selector '{0}' matched nothing")]
    NoContent(String),
}

/// Extracts a page
///
/// `selectors_key` is the job's content selector, if any.
pub trait Extractor: Send + Sync {
    fn extract(&self, page: &FetchedPage, selectors_key: Option<&str>) -> Result<Extracted, ExtractError>;
}

/// Default HTML extractor built on scraper
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn extract(&self, page: &FetchedPage, selectors_key: Option<&str>) -> Result<Extracted, ExtractError> {
        if let Some(content_type) = &page.content_type {
            let lower = content_type.to_ascii_lowercase();
            if !lower.contains("html") {
                return Err(ExtractError::UnsupportedContent(content_type.clone()));
            }
        }

        let document = Html::parse_document(&page.body);
        let root = content_root(&document, selectors_key)?;

        Ok(Extracted {
            title: extract_title(&document),
            content: root.map(visible_text).unwrap_or_default(),
            links: extract_links(&document, &page.final_url),
            code_blocks: root.map(extract_code_blocks).unwrap_or_default(),
        })
    }
}

fn content_root<'a>(document: &'a Html, selectors_key: Option<&str>) -> Result<Option<ElementRef<'a>>, ExtractError> {
    if let Some(css) = selectors_key {
        let selector = Selector::parse(css).map_err(|_| ExtractError::InvalidSelector(css.to_string()))?;
        return document
            .select(&selector)
            .next()
            .map(Some)
            .ok_or_else(|| ExtractError::NoContent(css.to_string()));
    }

    for css in ["main", "article", "body"] {
        if let Ok(selector) = Selector::parse(css) {
            if let Some(element) = document.select(&selector).next() {
                return Ok(Some(element));
            }
        }
    }
    Ok(None)
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Text of an element without script and style contents, whitespace collapsed
fn visible_text(root: ElementRef<'_>) -> String {
    let mut words = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

fn extract_code_blocks(root: ElementRef<'_>) -> Vec<CodeBlock> {
    let (Ok(pre), Ok(code)) = (Selector::parse("pre"), Selector::parse("code")) else {
        return Vec::new();
    };

    root.select(&pre)
        .filter_map(|element| {
            let text = element.text().collect::<String>();
            let text = text.trim_matches('\n');
            if text.trim().is_empty() {
                return None;
            }
            let language = language_of(element).or_else(|| element.select(&code).next().and_then(language_of));
            Some(CodeBlock {
                language,
                code: text.to_string(),
            })
        })
        .collect()
}

/// Language from a `language-xxx` or `lang-xxx` class
fn language_of(element: ElementRef<'_>) -> Option<String> {
    element.value().classes().find_map(|class| {
        class
            .strip_prefix("language-")
            .or_else(|| class.strip_prefix("lang-"))
            .filter(|lang| !lang.is_empty())
            .map(str::to_lowercase)
    })
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |href: &str| {
        if let Some(absolute_url) = resolve_link(href, base_url) {
            if seen.insert(absolute_url.clone()) {
                links.push(absolute_url);
            }
        }
    };

    // Extract links from <a> tags
    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    // Extract canonical link
    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    matches!(absolute_url.scheme(), "http" | "https").then(|| absolute_url.to_string())
}
