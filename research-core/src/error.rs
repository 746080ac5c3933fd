//! Error types for the research-core crate.
//!
//! Only whole-request failures are errors. Per-URL fetch failures and filter
//! decisions are recorded as data in [`crate::types::FetchOutcome`] and never
//! abort a request.

/// Errors surfaced by research operations.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// The search backend was unreachable, errored, or produced no candidates.
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    /// A filter update was rejected (e.g. an unparseable regex). Nothing was applied.
    #[error("invalid filter update: {0}")]
    InvalidFilterUpdate(String),

    /// The shared (slow) cache tier failed.
    #[error("cache backend error: {0}")]
    CacheBackend(String),

    /// An HTTP client could not be built or used.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid configuration or request options.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for research-core results.
pub type Result<T> = std::result::Result<T, ResearchError>;
