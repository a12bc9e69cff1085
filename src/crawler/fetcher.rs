//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the crawler's user agent
//! - Manual redirect following with a hop limit
//! - Body size capping (truncate, never reject)
//! - Retry with exponential backoff and jitter
//! - Error classification

use crate::config::CrawlerConfig;
use crate::crawler::parser::detect_server;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, ClientBuilder, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// ±20% randomness applied to every backoff delay
const JITTER_PERCENT: f64 = 0.2;

/// Failure classes recorded in the error log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionError,
    HttpError,
    ParseError,
    ResourceExhausted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::HttpError => "http_error",
            Self::ParseError => "parse_error",
            Self::ResourceExhausted => "resource_exhausted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a URL after its retry budget ran out
#[derive(Debug, Clone, Error)]
#[error("{kind} after {attempts} attempt(s): {message}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Body bytes, at most `max_response_bytes`
    pub body: Vec<u8>,
    /// URL that produced the body, after redirects
    pub final_url: Url,
    /// Server identification, empty when the server sent none
    pub server: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// True if the body was cut at the size cap
    pub truncated: bool,
}

/// Limits applied to every fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_redirects: u32,
}

impl FetchOptions {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_response_bytes: config.max_response_bytes,
            max_retries: config.max_retries.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_redirects: config.max_redirects,
        }
    }
}

/// Returns a client builder with the crawler's defaults applied
///
/// Redirects are disabled on the client; [`Fetcher`] follows them itself so
/// the hop limit is enforced per attempt.
pub fn client_builder(options: &FetchOptions, user_agent: &str) -> ClientBuilder {
    Client::builder()
        .user_agent(user_agent)
        .timeout(options.timeout)
        .connect_timeout(options.timeout)
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
}

/// Delay before retry number `retry` (1-based): base doubled per retry, ±20%
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let exp = base.as_millis() as f64 * 2f64.powi(retry.saturating_sub(1) as i32);
    let jitter = rand::thread_rng().gen_range(-JITTER_PERCENT..=JITTER_PERCENT);
    Duration::from_millis((exp * (1.0 + jitter)).max(0.0) as u64)
}

fn is_accepted_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn classify(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_decode() {
        ErrorKind::ParseError
    } else if error.is_status() {
        ErrorKind::HttpError
    } else {
        ErrorKind::ConnectionError
    }
}

type AttemptError = (ErrorKind, String);

/// Bounded HTTP fetcher shared by all workers
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(options: FetchOptions, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = client_builder(&options, user_agent).build()?;
        Ok(Self { client, options })
    }

    /// Uses a prebuilt client; it should come from [`client_builder`]
    pub fn with_client(client: Client, options: FetchOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetches `url`, retrying every failure class until the budget is spent
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Status 200 | Success |
    /// | Status 301/302/307/308 | Follow `Location`, up to `max_redirects` hops |
    /// | Any other status | Retry as `http_error` |
    /// | Timeout | Retry as `timeout` |
    /// | Connect/transport failure | Retry as `connection_error` |
    /// | Undecodable body | Retry as `parse_error` |
    ///
    /// Attempts are spaced by [`backoff_delay`].
    pub async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let max_attempts = self.options.max_retries.max(1);
        let mut last_error = (ErrorKind::ConnectionError, String::new());

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = backoff_delay(self.options.retry_base_delay, attempt - 1);
                tracing::debug!("Retrying {} in {:?} (attempt {})", url, delay, attempt);
                tokio::time::sleep(delay).await;
            }

            match self.attempt(url).await {
                Ok(mut result) => {
                    result.attempts = attempt;
                    return Ok(result);
                }
                Err((kind, message)) => {
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {} ({})",
                        attempt,
                        max_attempts,
                        url,
                        kind,
                        message
                    );
                    last_error = (kind, message);
                }
            }
        }

        let (kind, message) = last_error;
        Err(FetchError {
            kind,
            message,
            attempts: max_attempts,
        })
    }

    /// One attempt: a GET plus any redirects it leads to
    async fn attempt(&self, url: &Url) -> Result<FetchResult, AttemptError> {
        let mut current = url.clone();

        for _ in 0..=self.options.max_redirects {
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| (classify(&e), e.to_string()))?;

            let status = response.status();

            if is_accepted_redirect(status) {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        (
                            ErrorKind::HttpError,
                            format!("HTTP {} without Location header", status.as_u16()),
                        )
                    })?;
                current = current.join(location).map_err(|e| {
                    (
                        ErrorKind::HttpError,
                        format!("Invalid redirect target '{}': {}", location, e),
                    )
                })?;
                continue;
            }

            if status != StatusCode::OK {
                return Err((ErrorKind::HttpError, format!("HTTP {}", status.as_u16())));
            }

            let server = detect_server(response.headers());
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let final_url = response.url().clone();

            let (body, truncated) = self.read_capped(response).await?;
            if truncated {
                tracing::debug!(
                    "Truncated {} at {} bytes",
                    final_url,
                    self.options.max_response_bytes
                );
            }

            return Ok(FetchResult {
                body,
                final_url,
                server,
                status: status.as_u16(),
                content_type,
                attempts: 1,
                truncated,
            });
        }

        Err((
            ErrorKind::HttpError,
            format!(
                "Exceeded {} redirects starting from {}",
                self.options.max_redirects, url
            ),
        ))
    }

    /// Streams the body, stopping once the cap is reached
    async fn read_capped(
        &self,
        mut response: reqwest::Response,
    ) -> Result<(Vec<u8>, bool), AttemptError> {
        let cap = self.options.max_response_bytes;
        let mut body = Vec::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| (classify(&e), e.to_string()))?
        {
            let remaining = cap - body.len();
            if chunk.len() > remaining {
                body.extend_from_slice(&chunk[..remaining]);
                return Ok((body, true));
            }
            body.extend_from_slice(&chunk);
        }

        Ok((body, false))
    }
}
