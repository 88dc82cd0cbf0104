//! Crawl scope for Doc-Harvester
//!
//! This module provides URL canonicalization, allowed-domain patterns, stop
//! patterns and the scope check every URL passes before it enters a job's
//! frontier.

mod normalize;
mod stop;

pub use normalize::{canonicalize, canonicalize_url};
pub use stop::{StopList, StopPattern};

use url::Url;

/// Why a URL was kept out of the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Host is not in the allowed domains
    OutOfDomain,
    /// URL matches a stop pattern
    Stopped,
}

/// One entry of a job's allowed-domain list
///
/// `*.example.com` admits `example.com` and any host below it; anything
/// else must equal the host. Both forms compare lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    Exact(String),
    Subdomains(String),
}

impl DomainPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_lowercase();
        match pattern.strip_prefix("*.") {
            Some(base) => Self::Subdomains(base.to_string()),
            None => Self::Exact(pattern),
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(domain) => host == domain.as_str(),
            Self::Subdomains(base) => {
                host == base.as_str()
                    || host
                        .strip_suffix(base.as_str())
                        .is_some_and(|label| label.ends_with('.'))
            }
        }
    }
}

/// Allowed domains plus stop patterns of one job
#[derive(Debug, Clone, Default)]
pub struct CrawlScope {
    allowed_domains: Vec<String>,
    patterns: Vec<DomainPattern>,
    stops: StopList,
}

impl CrawlScope {
    /// Creates a scope
    ///
    /// An empty `allowed_domains` list admits every host.
    pub fn new(allowed_domains: Vec<String>, stops: StopList) -> Self {
        let allowed_domains: Vec<String> = allowed_domains
            .into_iter()
            .map(|d| d.to_lowercase())
            .collect();
        let patterns = allowed_domains.iter().map(|d| DomainPattern::parse(d)).collect();
        Self {
            allowed_domains,
            patterns,
            stops,
        }
    }

    /// Checks a canonical URL against the scope
    ///
    /// Domain checks come first so out-of-domain links are reported as such
    /// even when they also match a stop pattern.
    pub fn check(&self, url: &Url) -> Result<(), Rejection> {
        if !self.allows_domain(url) {
            return Err(Rejection::OutOfDomain);
        }
        if self.stops.matches(url.as_str()) {
            return Err(Rejection::Stopped);
        }
        Ok(())
    }

    /// Checks the URL's host, ignoring port and case
    pub fn allows_domain(&self, url: &Url) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        match url.host_str().map(str::to_lowercase) {
            Some(host) => self.patterns.iter().any(|pattern| pattern.matches(&host)),
            None => false,
        }
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StopUrlEntry;

    fn scope() -> CrawlScope {
        let stops = StopList::compile(&[StopUrlEntry::Substring("/private".to_string())]).unwrap();
        CrawlScope::new(vec!["*.Example.com".to_string()], stops)
    }

    #[test]
    fn test_in_scope() {
        let url = Url::parse("https://docs.example.com/guide").unwrap();
        assert_eq!(scope().check(&url), Ok(()));
    }

    #[test]
    fn test_out_of_domain() {
        let url = Url::parse("https://other.org/guide").unwrap();
        assert_eq!(scope().check(&url), Err(Rejection::OutOfDomain));
    }

    #[test]
    fn test_out_of_domain_wins_over_stop() {
        let url = Url::parse("https://other.org/private").unwrap();
        assert_eq!(scope().check(&url), Err(Rejection::OutOfDomain));
    }

    #[test]
    fn test_stopped() {
        let url = Url::parse("https://example.com/private/keys").unwrap();
        assert_eq!(scope().check(&url), Err(Rejection::Stopped));
    }

    #[test]
    fn test_empty_domain_list_allows_all() {
        let scope = CrawlScope::default();
        let url = Url::parse("https://anything.dev/").unwrap();
        assert!(scope.allows_domain(&url));
    }

    #[test]
    fn test_pattern_parse() {
        assert_eq!(
            DomainPattern::parse("*.Docs.Rs"),
            DomainPattern::Subdomains("docs.rs".to_string())
        );
        assert_eq!(
            DomainPattern::parse("docs.rs"),
            DomainPattern::Exact("docs.rs".to_string())
        );
    }

    #[test]
    fn test_subdomain_pattern_needs_label_boundary() {
        let pattern = DomainPattern::parse("*.example.com");
        assert!(pattern.matches("example.com"));
        assert!(pattern.matches("api.v2.example.com"));
        assert!(!pattern.matches("myexample.com"));
        assert!(!pattern.matches("example.com.org"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn test_exact_pattern_excludes_subdomains() {
        let pattern = DomainPattern::parse("example.com");
        assert!(pattern.matches("example.com"));
        assert!(!pattern.matches("blog.example.com"));
    }

    #[test]
    fn test_host_compared_without_port_or_case() {
        let local = CrawlScope::new(vec!["127.0.0.1".to_string()], StopList::default());
        assert!(local.allows_domain(&Url::parse("http://127.0.0.1:3000/docs").unwrap()));

        let upper = Url::parse("https://DOCS.EXAMPLE.COM:8443/").unwrap();
        assert!(scope().allows_domain(&upper));
    }

    #[test]
    fn test_hostless_url_rejected() {
        let url = Url::parse("data:text/plain,hello").unwrap();
        assert_eq!(scope().check(&url), Err(Rejection::OutOfDomain));
    }
}
