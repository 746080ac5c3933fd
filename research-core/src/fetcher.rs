//! Single-URL retrieval with bounded timeouts and retry on transient failures.

use crate::config::FetchConfig;
use crate::error::ResearchError;
use crate::http::{build_fetch_client, user_agent_for};
use crate::types::FetchErrorKind;
use crate::url_normalize::parse_http_url;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::error::Error as _;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub requested_url: String,
    /// URL after following redirects.
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Why a fetch gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FetchErrorKind,
    pub detail: String,
    /// Attempts made before giving up (zero when the URL was never requested).
    pub attempts: u32,
    transient: bool,
}

impl FetchFailure {
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        let transient = matches!(kind, FetchErrorKind::Timeout)
            || matches!(kind, FetchErrorKind::HttpStatus(code) if is_transient_status(code));
        Self {
            kind,
            detail: detail.into(),
            attempts: 0,
            transient,
        }
    }

    fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Retrieves raw page bodies. Implementations must be safe for concurrent use.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, trying at most `max_retries + 1` times.
    ///
    /// Each attempt is bounded by `timeout`. Only transient failures
    /// (timeouts, dropped connections, 5xx, 429) are retried.
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<FetchedPage, FetchFailure>;
}

/// [`PageFetcher`] backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, ResearchError> {
        let client = build_fetch_client(&config)?;
        Ok(Self { client, config })
    }

    /// Backoff before retry number `attempt + 1`.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor)).min(MAX_BACKOFF)
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchFailure> {
        let mut response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent_for(&self.config))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::new(
                FetchErrorKind::HttpStatus(status.as_u16()),
                format!("HTTP {status}"),
            ));
        }

        let limit = self.config.max_body_bytes;
        if let Some(length) = response.content_length() {
            if length > limit as u64 {
                return Err(FetchFailure::new(
                    FetchErrorKind::ContentTooLarge,
                    format!("content-length {length} exceeds {limit} bytes"),
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify_error(&e))? {
            if body.len() + chunk.len() > limit {
                return Err(FetchFailure::new(
                    FetchErrorKind::ContentTooLarge,
                    format!("body exceeds {limit} bytes"),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            status: status.as_u16(),
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<FetchedPage, FetchFailure> {
        let Some(parsed) = parse_http_url(url) else {
            return Err(FetchFailure::new(
                FetchErrorKind::MalformedUrl,
                format!("not an absolute http(s) URL: {url}"),
            ));
        };

        let mut attempt = 0u32;
        loop {
            match self.attempt(&parsed, timeout).await {
                Ok(page) => {
                    tracing::debug!(url, attempts = attempt + 1, status = page.status, bytes = page.body.len(), "fetched");
                    return Ok(page);
                }
                Err(failure) if failure.is_transient() && attempt < max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(url, attempt = attempt + 1, error = %failure, delay_ms = delay.as_millis() as u64, "transient fetch failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(mut failure) => {
                    failure.attempts = attempt + 1;
                    tracing::debug!(url, attempts = failure.attempts, error = %failure, "fetch failed");
                    return Err(failure);
                }
            }
        }
    }
}

fn is_transient_status(code: u16) -> bool {
    code == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(&code)
}

/// True when the error chain shows a name-resolution failure.
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        let text = err.to_string().to_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        source = err.source();
    }
    false
}

fn classify_error(error: &reqwest::Error) -> FetchFailure {
    let detail = error.to_string();
    if error.is_timeout() {
        return FetchFailure::new(FetchErrorKind::Timeout, detail);
    }
    if error.is_builder() {
        return FetchFailure::new(FetchErrorKind::MalformedUrl, detail);
    }
    if error.is_redirect() {
        return FetchFailure::new(FetchErrorKind::ConnectionError, detail).with_transient(false);
    }
    if error.is_connect() && is_dns_failure(error) {
        return FetchFailure::new(FetchErrorKind::ConnectionError, detail).with_transient(false);
    }
    FetchFailure::new(FetchErrorKind::ConnectionError, detail).with_transient(true)
}
