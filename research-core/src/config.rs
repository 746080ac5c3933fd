//! Configuration for the research pipeline with sensible defaults.
//!
//! [`ResearchConfig`] groups the cache, fetch, search and per-request
//! defaults. Every struct deserializes with `#[serde(default)]`, so an
//! embedding application only needs to spell out what it changes.

use crate::error::ResearchError;
use crate::types::ResearchOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Two-tier cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held in the in-process tier.
    pub max_entries: usize,
    /// Time-to-live of in-process entries, in seconds.
    pub memory_ttl_secs: u64,
    /// Time-to-live of shared-tier entries, in seconds.
    pub remote_ttl_secs: u64,
    /// Redis URL for the shared tier. `None` means memory only.
    pub remote_url: Option<String>,
    /// Namespace prepended to every shared-tier key.
    pub key_prefix: String,
    /// Bound on every shared-tier operation, in milliseconds. An operation
    /// that exceeds it counts as a backend error.
    pub remote_timeout_ms: u64,
}

/// Longest accepted cache time-to-live, in seconds (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 128,
            memory_ttl_secs: 3600,
            remote_ttl_secs: 86_400,
            remote_url: None,
            key_prefix: "web-research:".to_owned(),
            remote_timeout_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn remote_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_ttl_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

/// HTTP fetch settings shared by every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Retries for transient failures.
    pub max_retries: u32,
    /// Base backoff between retries; doubled on every attempt.
    pub retry_backoff_ms: u64,
    /// Response bodies larger than this are rejected.
    pub max_body_bytes: usize,
    /// Cap on fetches in flight across all requests. `None` means unbounded.
    pub global_concurrency: Option<usize>,
    /// Custom User-Agent string. If `None`, rotates through a built-in list
    /// of realistic browser User-Agents.
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            connect_timeout_secs: 5,
            max_retries: 2,
            retry_backoff_ms: 250,
            max_body_bytes: 2 * 1024 * 1024,
            global_concurrency: None,
            user_agent: None,
        }
    }
}

/// Search backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the DuckDuckGo HTML endpoint.
    pub endpoint: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Whether to request safe search filtering.
    pub safe_search: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_owned(),
            timeout_secs: 10,
            safe_search: true,
        }
    }
}

/// Per-request defaults applied when the caller does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub max_results: usize,
    pub concurrency: usize,
    pub deadline_secs: u64,
    pub max_content_chars: usize,
    pub min_content_chars: usize,
    /// Minimum text length for the single-page path.
    pub page_min_content_chars: usize,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            max_results: 50,
            concurrency: 20,
            deadline_secs: 60,
            max_content_chars: 5000,
            min_content_chars: 600,
            page_min_content_chars: 100,
        }
    }
}

/// Complete configuration of a [`crate::pipeline::ResearchPipeline`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub search: SearchConfig,
    pub research: RequestDefaults,
}

impl ResearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `cache.max_entries` must be greater than 0
    /// - cache TTLs must not exceed [`MAX_CACHE_TTL_SECS`]
    /// - `cache.remote_timeout_ms` must be greater than 0
    /// - fetch and search timeouts must be greater than 0
    /// - `research.max_results`, `research.concurrency`, `research.deadline_secs` must be greater than 0
    /// - `fetch.global_concurrency`, when set, must be greater than 0
    /// - content bounds must not be inverted
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.cache.max_entries == 0 {
            return Err(ResearchError::Config(
                "cache.max_entries must be greater than 0".into(),
            ));
        }
        if self.cache.memory_ttl_secs > MAX_CACHE_TTL_SECS
            || self.cache.remote_ttl_secs > MAX_CACHE_TTL_SECS
        {
            return Err(ResearchError::Config(format!(
                "cache TTLs must not exceed {MAX_CACHE_TTL_SECS} seconds"
            )));
        }
        if self.cache.remote_timeout_ms == 0 {
            return Err(ResearchError::Config(
                "cache.remote_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ResearchError::Config(
                "fetch.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.search.timeout_secs == 0 {
            return Err(ResearchError::Config(
                "search.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.fetch.global_concurrency == Some(0) {
            return Err(ResearchError::Config(
                "fetch.global_concurrency must be greater than 0".into(),
            ));
        }
        if self.fetch.max_body_bytes == 0 {
            return Err(ResearchError::Config(
                "fetch.max_body_bytes must be greater than 0".into(),
            ));
        }
        self.default_options().validate()?;
        if self.research.page_min_content_chars > self.research.max_content_chars {
            return Err(ResearchError::Config(
                "research.page_min_content_chars must be <= max_content_chars".into(),
            ));
        }
        Ok(())
    }

    /// Request options seeded from the configured defaults.
    pub fn default_options(&self) -> ResearchOptions {
        ResearchOptions {
            max_results: self.research.max_results,
            concurrency: self.research.concurrency,
            fetch_timeout: Duration::from_secs(self.fetch.timeout_secs),
            max_retries: self.fetch.max_retries,
            request_deadline: Duration::from_secs(self.research.deadline_secs),
            max_content_chars: self.research.max_content_chars,
            min_content_chars: self.research.min_content_chars,
            ..ResearchOptions::default()
        }
    }

    /// Options for `fetch_page`, which uses a more lenient minimum length.
    pub fn page_options(&self) -> ResearchOptions {
        ResearchOptions {
            min_content_chars: self.research.page_min_content_chars,
            ..self.default_options()
        }
    }
}
