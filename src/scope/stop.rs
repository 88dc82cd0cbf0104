use crate::config::{StopUrlEntry, TypedStopUrl};
use crate::scope::canonicalize;
use crate::ConfigError;
use regex::Regex;

/// A compiled stop URL pattern
#[derive(Debug, Clone)]
pub enum StopPattern {
    /// Matches one canonical URL
    Exact(String),
    /// Matches any URL containing the text
    Substring(String),
    /// Matches any URL the expression finds a match in
    Regex(Regex),
}

impl StopPattern {
    /// Compiles a configuration entry
    ///
    /// Exact patterns are canonicalized so they compare equal to the
    /// canonical URLs the frontier checks against them.
    pub fn compile(entry: &StopUrlEntry) -> Result<Self, ConfigError> {
        Ok(match entry {
            StopUrlEntry::Substring(s) | StopUrlEntry::Typed(TypedStopUrl::Substring(s)) => {
                Self::Substring(s.clone())
            }
            StopUrlEntry::Typed(TypedStopUrl::Exact(s)) => Self::Exact(
                canonicalize(s)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| s.clone()),
            ),
            StopUrlEntry::Typed(TypedStopUrl::Regex(p)) => {
                Self::Regex(Regex::new(p).map_err(|source| ConfigError::InvalidRegex {
                    pattern: p.clone(),
                    source,
                })?)
            }
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(s) => url == s,
            Self::Substring(s) => url.contains(s.as_str()),
            Self::Regex(re) => re.is_match(url),
        }
    }
}

/// The stop patterns of one job
#[derive(Debug, Clone, Default)]
pub struct StopList {
    patterns: Vec<StopPattern>,
}

impl StopList {
    pub fn compile<'a>(
        entries: impl IntoIterator<Item = &'a StopUrlEntry>,
    ) -> Result<Self, ConfigError> {
        let patterns = entries
            .into_iter()
            .map(StopPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns true if any pattern matches the canonical URL
    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(entries: Vec<StopUrlEntry>) -> StopList {
        StopList::compile(&entries).unwrap()
    }

    #[test]
    fn test_substring_pattern() {
        let stops = list(vec![StopUrlEntry::Substring("/changelog".to_string())]);
        assert!(stops.matches("https://docs.example.com/changelog/v2"));
        assert!(!stops.matches("https://docs.example.com/guide"));
    }

    #[test]
    fn test_exact_pattern_is_canonicalized() {
        let stops = list(vec![StopUrlEntry::Typed(TypedStopUrl::Exact(
            "https://Docs.Example.com/old/".to_string(),
        ))]);
        assert!(stops.matches("https://docs.example.com/old"));
        assert!(!stops.matches("https://docs.example.com/old/page"));
    }

    #[test]
    fn test_regex_pattern() {
        let stops = list(vec![StopUrlEntry::Typed(TypedStopUrl::Regex(
            r"/v\d+/".to_string(),
        ))]);
        assert!(stops.matches("https://docs.example.com/v3/api"));
        assert!(!stops.matches("https://docs.example.com/latest/api"));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let stops = StopList::default();
        assert!(stops.is_empty());
        assert!(!stops.matches("https://docs.example.com/"));
    }
}
