//! Core data types: search candidates, per-URL outcomes, and aggregated results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A single candidate returned by the search backend.
///
/// Candidates are not deduplicated or filtered at this stage; the pipeline
/// applies the [`crate::filters::FilterSet`] before anything is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The URL of the result page.
    pub url: String,
    /// The title shown by the search backend.
    pub title: String,
    /// Short text snippet, when the backend provides one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snippet: String,
}

impl SearchResult {
    /// Build a candidate without a snippet.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: String::new(),
        }
    }
}

/// Why a candidate was filtered instead of fetched or returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// The URL host matched a blocked domain.
    PreFetchDomain,
    /// The URL matched a skip pattern.
    PreFetchPattern,
    /// The page was fetched but its text looked like a bot-challenge page.
    PostFetchContent,
}

impl FilterReason {
    /// Stable wire name of this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreFetchDomain => "pre_fetch_domain",
            Self::PreFetchPattern => "pre_fetch_pattern",
            Self::PostFetchContent => "post_fetch_content",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a single-URL failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The fetch (or the request deadline) ran out of time.
    Timeout,
    /// Connection reset/refused, DNS failure, or a broken body stream.
    ConnectionError,
    /// The server answered with a non-success status.
    HttpStatus(u16),
    /// The URL could not be parsed or is not http(s).
    MalformedUrl,
    /// The response exceeded the body size cap.
    ContentTooLarge,
    /// Extraction produced less text than the configured minimum.
    ContentTooShort,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::ConnectionError => f.write_str("connection error"),
            Self::HttpStatus(code) => write!(f, "HTTP {code}"),
            Self::MalformedUrl => f.write_str("malformed URL"),
            Self::ContentTooLarge => f.write_str("content too large"),
            Self::ContentTooShort => f.write_str("content too short"),
        }
    }
}

/// Terminal result of processing one candidate URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The page was fetched, extracted, and passed the content filter.
    Success {
        url: String,
        /// URL after redirects.
        final_url: String,
        title: String,
        extracted_text: String,
        word_count: usize,
        fetched_at: DateTime<Utc>,
    },
    /// A filter policy excluded this URL.
    Filtered { url: String, reason: FilterReason },
    /// The fetch failed.
    Failed {
        url: String,
        error_kind: FetchErrorKind,
        detail: String,
    },
}

impl FetchOutcome {
    /// Build a failed outcome.
    pub fn failed(url: impl Into<String>, error_kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        Self::Failed {
            url: url.into(),
            error_kind,
            detail: detail.into(),
        }
    }

    /// Build a filtered outcome.
    pub fn filtered(url: impl Into<String>, reason: FilterReason) -> Self {
        Self::Filtered {
            url: url.into(),
            reason,
        }
    }

    /// The candidate URL this outcome belongs to.
    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::Filtered { url, .. } | Self::Failed { url, .. } => {
                url
            }
        }
    }

    /// Whether this outcome carries extracted content.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Number of characters of extracted text (zero for non-successes).
    pub fn content_chars(&self) -> usize {
        match self {
            Self::Success { extracted_text, .. } => extracted_text.chars().count(),
            _ => 0,
        }
    }
}

/// Counters describing one research request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchStats {
    /// Candidates returned by the search backend.
    pub searched: usize,
    /// Candidates that passed the pre-fetch filters and were dispatched.
    pub dispatched: usize,
    /// Outcomes with extracted content.
    pub succeeded: usize,
    /// Outcomes excluded by a filter (pre- or post-fetch).
    pub filtered: usize,
    /// Outcomes that failed.
    pub failed: usize,
    /// Total characters of extracted text across successes.
    pub content_chars: usize,
    /// Wall-clock time spent on the request.
    pub elapsed_ms: u64,
}

impl ResearchStats {
    /// Count outcomes by kind. `searched`, `dispatched` and `elapsed_ms` are left
    /// for the caller to fill in.
    pub fn tally(outcomes: &[FetchOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match outcome {
                FetchOutcome::Success { .. } => {
                    stats.succeeded += 1;
                    stats.content_chars += outcome.content_chars();
                }
                FetchOutcome::Filtered { .. } => stats.filtered += 1,
                FetchOutcome::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }
}

/// Aggregated result of a research request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// The query as given by the caller.
    pub query: String,
    /// One outcome per candidate, in search-ranking order.
    pub outcomes: Vec<FetchOutcome>,
    pub stats: ResearchStats,
    /// True when this result was served from cache.
    #[serde(default)]
    pub cached: bool,
}

impl ResearchResult {
    /// Iterate over successful outcomes in ranking order.
    pub fn successes(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }
}

/// Shape of the rendered output requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured JSON (best for programmatic consumers).
    #[default]
    Json,
    /// Plain concatenated page text.
    Raw,
    /// Markdown document with one section per source.
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "raw" => Ok(Self::Raw),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Per-request knobs for [`crate::pipeline::ResearchPipeline::research`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOptions {
    /// Number of candidates requested from the search backend (N).
    pub max_results: usize,
    /// Maximum fetches in flight for this request (K).
    pub concurrency: usize,
    /// Timeout for a single fetch attempt.
    pub fetch_timeout: Duration,
    /// Retries for transient fetch failures.
    pub max_retries: u32,
    /// Wall-clock bound for the whole request.
    pub request_deadline: Duration,
    /// Extracted text per page is truncated to this many characters.
    pub max_content_chars: usize,
    /// Pages yielding less text than this are recorded as failures.
    pub min_content_chars: usize,
    /// Read from and write to the cache.
    pub use_cache: bool,
    pub output_format: OutputFormat,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            max_results: 50,
            concurrency: 20,
            fetch_timeout: Duration::from_secs(20),
            max_retries: 2,
            request_deadline: Duration::from_secs(60),
            max_content_chars: 5000,
            min_content_chars: 600,
            use_cache: true,
            output_format: OutputFormat::Json,
        }
    }
}

/// Longest accepted per-attempt fetch timeout.
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Longest accepted whole-request deadline.
pub const MAX_REQUEST_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

impl ResearchOptions {
    /// Options for the single-page path: lenient minimum length.
    pub fn single_page() -> Self {
        Self {
            min_content_chars: 100,
            ..Self::default()
        }
    }

    /// Reject options the pipeline cannot honour.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_results == 0 {
            return Err(crate::ResearchError::Config(
                "max_results must be greater than 0".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(crate::ResearchError::Config(
                "concurrency must be greater than 0".into(),
            ));
        }
        if self.fetch_timeout.is_zero() || self.fetch_timeout > MAX_FETCH_TIMEOUT {
            return Err(crate::ResearchError::Config(format!(
                "fetch_timeout must be between 1s and {}s",
                MAX_FETCH_TIMEOUT.as_secs()
            )));
        }
        if self.request_deadline.is_zero() || self.request_deadline > MAX_REQUEST_DEADLINE {
            return Err(crate::ResearchError::Config(format!(
                "request_deadline must be between 1s and {}s",
                MAX_REQUEST_DEADLINE.as_secs()
            )));
        }
        if self.min_content_chars > self.max_content_chars {
            return Err(crate::ResearchError::Config(
                "min_content_chars must be <= max_content_chars".into(),
            ));
        }
        Ok(())
    }
}
