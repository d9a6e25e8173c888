//! Rate-limited HTTP fetcher
//!
//! This module handles every request the crawl makes:
//! - Building the HTTP client with the configured user agent
//! - Enforcing the minimum pause between the end of one request and the
//!   start of the next
//! - Observing the cancellation token while pausing
//! - Classifying failures (transient network vs. HTTP status)
//!
//! There are no retries at this layer; the coordinator decides whether a
//! failed page is skipped.

use crate::config::UserAgentConfig;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Classified fetch failure
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS, timeout or body-read failure
    #[error("network error for {url}: {message}")]
    TransientNetwork { url: String, message: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Stop signal observed before the request was sent
    #[error("cancelled before fetching {url}")]
    Cancelled { url: String },
}

impl FetchError {
    /// Returns the error class label used in logs
    pub fn class(&self) -> &'static str {
        match self {
            Self::TransientNetwork { .. } => "transient-network",
            Self::HttpStatus { .. } => "http-status",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL as requested
    pub requested_url: Url,

    /// URL after following redirects
    pub final_url: Url,

    pub status_code: u16,

    pub body: String,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use winworld_harvester::config::UserAgentConfig;
/// use winworld_harvester::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sleeps for `delay` unless the token is cancelled first
///
/// Returns false if the pause was interrupted by cancellation.
pub async fn interruptible_pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Sequential fetcher that enforces a minimum delay between requests
///
/// Only one request is ever in flight; `fetch` takes `&mut self` so the
/// borrow checker enforces that.
pub struct Fetcher {
    client: Client,
    delay: Duration,
    cancel: CancellationToken,
    last_completed: Option<Instant>,
    requests_sent: u64,
}

impl Fetcher {
    pub fn new(client: Client, delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            client,
            delay,
            cancel,
            last_completed: None,
            requests_sent: 0,
        }
    }

    /// Number of requests sent so far
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetches a page, waiting out the remainder of the pacing delay first
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - 2xx response with its body
    /// * `Err(FetchError)` - classified failure, already logged
    pub async fn fetch(&mut self, url: &Url) -> Result<FetchedPage, FetchError> {
        if !self.wait_for_slot().await {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        tracing::debug!("GET {}", url);
        self.requests_sent += 1;
        let result = self.send(url).await;
        self.last_completed = Some(Instant::now());

        if let Err(e) = &result {
            tracing::warn!(class = e.class(), "Fetch failed: {}", e);
        }

        result
    }

    async fn wait_for_slot(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let Some(last) = self.last_completed else {
            return true;
        };

        let elapsed = last.elapsed();
        if elapsed >= self.delay {
            return true;
        }

        interruptible_pause(self.delay - elapsed, &self.cancel).await
    }

    async fn send(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        Ok(FetchedPage {
            requested_url: url.clone(),
            final_url,
            status_code: status.as_u16(),
            body,
        })
    }
}

fn classify_transport_error(url: &Url, error: &reqwest::Error) -> FetchError {
    let message = if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    };

    FetchError::TransientNetwork {
        url: url.to_string(),
        message,
    }
}
