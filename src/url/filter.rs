use crate::config::FilterConfig;
use std::collections::HashSet;
use url::Url;

/// Static link filter built from the blacklist and skip-extension tables
///
/// Both tables are fixed for the lifetime of a crawl, so the filter is shared
/// read-only between workers.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    blacklist: Vec<String>,
    skip_extensions: HashSet<String>,
}

impl LinkFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            blacklist: config
                .blacklist
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            skip_extensions: config
                .skip_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    /// Returns true if `domain` matches any blacklist pattern
    pub fn is_blacklisted(&self, domain: &str) -> bool {
        self.blacklist
            .iter()
            .any(|pattern| matches_wildcard(pattern, domain))
    }

    /// Returns true if the last path segment ends in a skipped extension
    pub fn has_skipped_extension(&self, url: &Url) -> bool {
        let last_segment = url.path().rsplit('/').next().unwrap_or("");
        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.skip_extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }

    /// Returns true if the URL may be fetched
    pub fn accepts(&self, url: &Url, host: &str) -> bool {
        !self.has_skipped_extension(url) && !self.is_blacklisted(host)
    }
}

/// Checks if a domain matches a wildcard pattern
///
/// `"example.com"` matches only itself; `"*.example.com"` matches the bare
/// domain and any subdomain below it.
fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}
