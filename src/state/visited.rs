use std::collections::HashSet;

/// Deduplication sets consulted before anything enters the frontier
///
/// All three sets only grow during a run. `settled_domains` holds the
/// registrable domains already present in the registry when the process
/// started; URLs on those domains are skipped so a resumed crawl never fetches
/// them again.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: HashSet<String>,
    hosts: HashSet<String>,
    settled_domains: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set seeded with domains from a previous run
    pub fn with_settled<I>(domains: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            settled_domains: domains.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Inserts a normalized URL, returning false if it was already present
    pub fn insert_url(&mut self, url: &str) -> bool {
        if self.urls.contains(url) {
            return false;
        }
        self.urls.insert(url.to_string())
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Records a full host (subdomain), returning true the first time it is seen
    pub fn insert_host(&mut self, host: &str) -> bool {
        if self.hosts.contains(host) {
            return false;
        }
        self.hosts.insert(host.to_string())
    }

    pub fn is_settled(&self, domain: &str) -> bool {
        self.settled_domains.contains(domain)
    }

    pub fn url_count(&self) -> usize {
        self.urls.len()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn settled_count(&self) -> usize {
        self.settled_domains.len()
    }

    /// Releases spare capacity held by the sets
    pub fn shrink_to_fit(&mut self) {
        self.urls.shrink_to_fit();
        self.hosts.shrink_to_fit();
        self.settled_domains.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_url_once() {
        let mut visited = VisitedSet::new();
        assert!(visited.insert_url("https://a.com/"));
        assert!(!visited.insert_url("https://a.com/"));
        assert!(visited.contains_url("https://a.com/"));
        assert_eq!(visited.url_count(), 1);
    }

    #[test]
    fn test_hosts_are_independent_of_urls() {
        let mut visited = VisitedSet::new();
        assert!(visited.insert_host("api.a.com"));
        assert!(visited.insert_host("www.a.com"));
        assert!(!visited.insert_host("api.a.com"));
        assert_eq!(visited.host_count(), 2);
        assert_eq!(visited.url_count(), 0);
    }

    #[test]
    fn test_settled_domains() {
        let visited = VisitedSet::with_settled(vec!["a.com".to_string(), "b.org".to_string()]);
        assert!(visited.is_settled("a.com"));
        assert!(!visited.is_settled("c.net"));
        assert_eq!(visited.settled_count(), 2);
    }
}
