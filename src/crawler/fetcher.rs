//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with request and connect timeouts
//! - GET requests with bounded exponential-backoff retry
//! - Uniform classification of transport errors and non-2xx responses
//! - Whitespace canonicalization of fetched pages

use crate::config::FetchConfig;
use crate::CrawlError;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builds an HTTP client with the configured timeouts
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages and returns their canonical text
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    cancel: CancellationToken,
}

impl PageFetcher {
    /// Creates a fetcher from the fetch configuration
    ///
    /// The cancellation token is checked before every attempt and interrupts
    /// backoff sleeps.
    pub fn new(config: &FetchConfig, cancel: CancellationToken) -> Result<Self, CrawlError> {
        Ok(Self {
            client: build_http_client(config)?,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            cancel,
        })
    }

    /// Fetches a URL and returns its canonicalized body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Canonicalize and return |
    /// | Non-2xx | Retry, then `CrawlError::Fetch` |
    /// | Transport error / timeout | Retry, then `CrawlError::Fetch` |
    /// | Cancelled | `CrawlError::Fetch` with cause `cancelled` |
    ///
    /// Retries happen up to `max_retries` times, sleeping `initial_backoff`
    /// and doubling up to `max_backoff` between attempts.
    pub async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(fetch_failure(url, "cancelled"));
            }

            let cause = match self.fetch_once(url).await {
                Ok(body) => return Ok(canonicalize_html(&body)),
                Err(cause) => cause,
            };

            if attempt >= self.max_retries {
                return Err(fetch_failure(url, cause));
            }
            attempt += 1;

            tracing::debug!(
                "Fetch of {} failed ({}), retry {}/{} in {:?}",
                url,
                cause,
                attempt,
                self.max_retries,
                backoff
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(fetch_failure(url, "cancelled"));
                }
                _ = tokio::time::sleep(backoff) => {}
            }

            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    /// Performs a single GET, returning the raw body or a failure cause
    async fn fetch_once(&self, url: &str) -> Result<String, String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                "request timeout".to_string()
            } else if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                e.to_string()
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

fn fetch_failure(url: &str, cause: impl Into<String>) -> CrawlError {
    CrawlError::Fetch {
        url: url.to_string(),
        cause: cause.into(),
    }
}

/// Normalizes whitespace in an HTML page
///
/// Every whitespace run (spaces, tabs, newlines) becomes a single space,
/// whitespace directly between `>` and `<` is removed, and the result is
/// trimmed.
pub fn canonicalize_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pending_space = false;

    for c in html.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }

        if pending_space {
            let between_tags = c == '<' && out.ends_with('>');
            if !out.is_empty() && !between_tags {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(c);
    }

    out
}
