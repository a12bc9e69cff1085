//! Domain verification pass
//!
//! Rechecks every registered domain by requesting its root page. A HEAD
//! request is tried first; servers that let HEAD time out get one GET.
//! Redirects are followed, and a domain counts as accessible when the final
//! status is below 400. Results replace any earlier check for the same domain.

use crate::crawler::{client_builder, FetchOptions};
use crate::storage::{Storage, VerificationRecord};
use crate::Result;
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Totals from one verification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationSummary {
    pub checked: usize,
    pub accessible: usize,
    pub not_accessible: usize,
    /// Registered names that are not domains (IP addresses and the like)
    pub skipped: usize,
}

/// Checks registered domains for reachability
#[derive(Clone)]
pub struct Verifier {
    client: Client,
    concurrency: usize,
    port: Option<u16>,
}

impl Verifier {
    pub fn new(
        options: &FetchOptions,
        user_agent: &str,
        concurrency: usize,
    ) -> std::result::Result<Self, reqwest::Error> {
        let client = client_builder(options, user_agent)
            .redirect(Policy::limited(options.max_redirects as usize))
            .build()?;
        Ok(Self::with_client(client, concurrency))
    }

    /// Uses a prebuilt client; it should follow redirects itself
    pub fn with_client(client: Client, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            port: None,
        }
    }

    /// Sends checks to `port` instead of the scheme default
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    fn root_url(&self, domain: &str) -> String {
        match self.port {
            Some(port) => format!("http://{}:{}/", domain, port),
            None => format!("http://{}/", domain),
        }
    }

    async fn status_for(&self, method: Method, url: &str) -> reqwest::Result<u16> {
        let response = self.client.request(method, url).send().await?;
        Ok(response.status().as_u16())
    }

    /// Checks one domain; never fails, unreachable domains are recorded as such
    pub async fn verify_domain(&self, domain: &str) -> VerificationRecord {
        let url = self.root_url(domain);

        let status = match self.status_for(Method::HEAD, &url).await {
            Err(e) if e.is_timeout() => {
                tracing::debug!("HEAD timed out for {}, retrying with GET", domain);
                self.status_for(Method::GET, &url).await
            }
            other => other,
        };

        let status_code = match status {
            Ok(code) => Some(code),
            Err(e) => {
                tracing::debug!("Verification of {} failed: {}", domain, e);
                None
            }
        };

        VerificationRecord {
            domain: domain.to_string(),
            accessible: status_code.is_some_and(|code| code < 400),
            status_code,
            verified_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Verifies every registered domain and stores the results
    pub async fn verify_all<S: Storage>(&self, storage: &mut S) -> Result<VerificationSummary> {
        let mut summary = VerificationSummary::default();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for record in storage.load_domains()? {
            if !is_valid_domain(&record.domain) {
                tracing::debug!("Skipping invalid domain: {}", record.domain);
                summary.skipped += 1;
                continue;
            }

            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|e| crate::CrawlError::Worker(e.to_string()))?;
            let verifier = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                verifier.verify_domain(&record.domain).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| crate::CrawlError::Worker(e.to_string()))?;
            summary.checked += 1;
            if result.accessible {
                summary.accessible += 1;
            } else {
                summary.not_accessible += 1;
            }
            storage.record_verification(&result)?;
        }

        tracing::info!(
            "Verified {} domains: {} accessible, {} not accessible, {} skipped",
            summary.checked,
            summary.accessible,
            summary.not_accessible,
            summary.skipped
        );

        Ok(summary)
    }
}

/// True for dotted names whose last label is alphabetic and at least two long
pub fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let label_ok = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };

    let tld = labels[labels.len() - 1];
    labels.iter().all(label_ok) && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}
