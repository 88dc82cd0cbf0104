//! Sitemap discovery
//!
//! Parses `<urlset>` sitemaps and `<sitemapindex>` indexes with quick-xml and
//! follows indexes through a [`PageFetcher`].

use crate::crawler::fetcher::PageFetcher;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Nested sitemap indexes followed at most this deep
pub const MAX_SITEMAP_DEPTH: usize = 3;

/// Sitemaps fetched per job at most
pub const MAX_SITEMAPS: usize = 50;

/// A page listed in a sitemap
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    /// `<priority>`, 0.0 to 1.0
    pub priority: Option<f32>,
    /// Set for `<xhtml:link rel="alternate" hreflang>` entries
    pub hreflang: Option<String>,
}

/// Contents of one sitemap document
#[derive(Debug, Default, PartialEq)]
pub struct ParsedSitemap {
    /// Pages from a `<urlset>`
    pub entries: Vec<SitemapEntry>,
    /// Child sitemaps from a `<sitemapindex>`
    pub sitemaps: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("malformed sitemap XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Loc,
    Priority,
}

#[derive(Debug, Default)]
struct PartialUrl {
    loc: Option<String>,
    priority: Option<f32>,
    alternates: Vec<(String, String)>,
}

/// Parses a sitemap or sitemap index
///
/// Alternate-language links are returned as extra entries only when
/// `include_alternates` is set; they inherit the priority of their `<url>`.
pub fn parse_sitemap(xml: &str, include_alternates: bool) -> Result<ParsedSitemap, SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parsed = ParsedSitemap::default();
    let mut current_url: Option<PartialUrl> = None;
    let mut in_sitemap = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"url" => current_url = Some(PartialUrl::default()),
                b"sitemap" => in_sitemap = true,
                b"loc" => {
                    field = Some(Field::Loc);
                    text.clear();
                }
                b"priority" => {
                    field = Some(Field::Priority);
                    text.clear();
                }
                b"link" => push_alternate(e, current_url.as_mut()),
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.local_name().as_ref() == b"link" {
                    push_alternate(e, current_url.as_mut());
                }
            }
            Event::Text(ref e) => {
                if field.is_some() {
                    if let Ok(t) = e.unescape() {
                        text.push_str(&t);
                    }
                }
            }
            Event::CData(ref e) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"loc" | b"priority" => {
                    let value = text.trim().to_string();
                    match (field.take(), current_url.as_mut()) {
                        (Some(Field::Loc), Some(url)) => url.loc = Some(value),
                        (Some(Field::Priority), Some(url)) => url.priority = value.parse().ok(),
                        (Some(Field::Loc), None) if in_sitemap => parsed.sitemaps.push(value),
                        _ => {}
                    }
                }
                b"sitemap" => in_sitemap = false,
                b"url" => {
                    if let Some(url) = current_url.take() {
                        finish_url(url, include_alternates, &mut parsed.entries);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(parsed)
}

fn push_alternate(e: &BytesStart<'_>, url: Option<&mut PartialUrl>) {
    let Some(url) = url else { return };

    let mut rel = None;
    let mut hreflang = None;
    let mut href = None;
    for attr in e.attributes().flatten() {
        let Ok(value) = attr.unescape_value() else { continue };
        match attr.key.local_name().as_ref() {
            b"rel" => rel = Some(value.into_owned()),
            b"hreflang" => hreflang = Some(value.into_owned()),
            b"href" => href = Some(value.into_owned()),
            _ => {}
        }
    }

    if let (Some("alternate"), Some(lang), Some(href)) = (rel.as_deref(), hreflang, href) {
        url.alternates.push((href, lang));
    }
}

fn finish_url(url: PartialUrl, include_alternates: bool, entries: &mut Vec<SitemapEntry>) {
    let Some(loc) = url.loc.filter(|l| !l.is_empty()) else {
        return;
    };

    entries.push(SitemapEntry {
        loc: loc.clone(),
        priority: url.priority,
        hreflang: None,
    });

    if include_alternates {
        for (href, lang) in url.alternates {
            // The alternate list usually names the page itself too
            if href != loc {
                entries.push(SitemapEntry {
                    loc: href,
                    priority: url.priority,
                    hreflang: Some(lang),
                });
            }
        }
    }
}

/// Result of walking a job's sitemaps
#[derive(Debug, Default)]
pub struct SitemapDiscovery {
    pub entries: Vec<SitemapEntry>,
    /// Sitemaps fetched and parsed
    pub fetched: usize,
    /// One line per sitemap that could not be used
    pub failures: Vec<String>,
}

/// Fetches sitemaps and follows sitemap indexes
///
/// A sitemap that fails to download or parse is recorded and skipped; the
/// job decides whether what is left is enough to start.
pub async fn discover_sitemaps(
    fetcher: &dyn PageFetcher,
    sitemap_urls: &[String],
    include_alternates: bool,
) -> SitemapDiscovery {
    let mut discovery = SitemapDiscovery::default();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<(String, usize)> =
        sitemap_urls.iter().map(|u| (u.clone(), 0)).collect();

    while let Some((url, depth)) = queue.pop_front() {
        if !seen.insert(url.clone()) {
            continue;
        }
        if discovery.fetched + discovery.failures.len() >= MAX_SITEMAPS {
            tracing::warn!("Sitemap limit of {} reached, ignoring the rest", MAX_SITEMAPS);
            break;
        }

        let page = match fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Failed to fetch sitemap {}: {}", url, e);
                discovery.failures.push(format!("{}: {}", url, e));
                continue;
            }
        };

        let parsed = match parse_sitemap(&page.body, include_alternates) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to parse sitemap {}: {}", url, e);
                discovery.failures.push(format!("{}: {}", url, e));
                continue;
            }
        };

        discovery.fetched += 1;
        tracing::debug!(
            "Sitemap {}: {} pages, {} child sitemaps",
            url,
            parsed.entries.len(),
            parsed.sitemaps.len()
        );
        discovery.entries.extend(parsed.entries);

        if depth < MAX_SITEMAP_DEPTH {
            queue.extend(parsed.sitemaps.into_iter().map(|child| (child, depth + 1)));
        } else if !parsed.sitemaps.is_empty() {
            tracing::warn!("Sitemap index {} nested too deep, not following", url);
        }
    }

    discovery
}
