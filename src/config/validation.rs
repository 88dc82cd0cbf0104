use crate::config::types::{
    BatchConfig, Config, CrawlerConfig, JobEntry, StateConfig, StopUrlEntry, TypedStopUrl,
};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_state_config(&config.state)?;
    validate_batch_config(&config.batch)?;
    validate_jobs(&config.jobs)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout-ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.follow_redirects && config.max_redirects < 1 {
        return Err(ConfigError::Validation(
            "max-redirects must be >= 1 when follow-redirects is enabled".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    for pattern in &config.allowed_domains {
        validate_domain_pattern(pattern)?;
    }
    validate_stop_urls(&config.stop_urls)?;

    Ok(())
}

/// Validates checkpoint configuration
fn validate_state_config(config: &StateConfig) -> Result<(), ConfigError> {
    if config.dir.is_empty() {
        return Err(ConfigError::Validation(
            "state dir cannot be empty".to_string(),
        ));
    }

    if config.autosave_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "autosave-interval-secs must be >= 1".to_string(),
        ));
    }

    if config.autosave_every_pages < 1 {
        return Err(ConfigError::Validation(
            "autosave-every-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates batch configuration
fn validate_batch_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.max_parallel < 1 || config.max_parallel > 64 {
        return Err(ConfigError::Validation(format!(
            "max-parallel must be between 1 and 64, got {}",
            config.max_parallel
        )));
    }
    Ok(())
}

/// Validates job entries
fn validate_jobs(jobs: &[JobEntry]) -> Result<(), ConfigError> {
    if jobs.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[jobs]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for job in jobs {
        validate_job_id(&job.id)?;
        if !seen.insert(job.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate job id '{}'",
                job.id
            )));
        }

        if job.start_urls.is_empty() && job.sitemap_urls.is_empty() && job.base_url.is_none() {
            return Err(ConfigError::Validation(format!(
                "job '{}' needs start-urls, sitemap-urls or base-url",
                job.id
            )));
        }

        for url in job
            .start_urls
            .iter()
            .chain(job.sitemap_urls.iter())
            .chain(job.base_url.iter())
        {
            validate_http_url(url)?;
        }

        if job.output.is_empty() {
            return Err(ConfigError::Validation(format!(
                "job '{}' output cannot be empty",
                job.id
            )));
        }

        for pattern in &job.allowed_domains {
            validate_domain_pattern(pattern)?;
        }
        validate_stop_urls(&job.stop_urls)?;
    }

    Ok(())
}

/// Job ids name state files, so they are restricted to a file-safe alphabet
fn validate_job_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::Validation("job id cannot be empty".to_string()));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "job id must contain only ASCII letters, digits, '-', '_' or '.', got '{}'",
            id
        )));
    }

    Ok(())
}

fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "'{}' must use http or https",
            raw
        )));
    }

    Ok(())
}

/// Compiles every regex stop pattern once so bad patterns fail at load time
fn validate_stop_urls(entries: &[StopUrlEntry]) -> Result<(), ConfigError> {
    for entry in entries {
        match entry {
            StopUrlEntry::Typed(TypedStopUrl::Regex(pattern)) => {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })?;
            }
            StopUrlEntry::Substring(p)
            | StopUrlEntry::Typed(TypedStopUrl::Substring(p))
            | StopUrlEntry::Typed(TypedStopUrl::Exact(p)) => {
                if p.is_empty() {
                    return Err(ConfigError::InvalidPattern(
                        "stop URL pattern cannot be empty".to_string(),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_domain_string(domain)
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
