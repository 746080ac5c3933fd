//! # research-core
//!
//! Concurrent web research: search, filter, fetch, extract, cache.
//!
//! Given a query, the pipeline retrieves ranked candidate URLs from a search
//! backend, drops undesirable ones, fetches the rest concurrently under a
//! per-request limit and a global deadline, extracts readable text, and
//! returns one outcome per candidate in search order together with
//! statistics. Results are cached in a bounded in-process LRU tier with an
//! optional shared Redis tier.
//!
//! ## Design
//!
//! - No API keys: DuckDuckGo's HTML endpoint is scraped with CSS selectors
//! - Search backend, fetcher and extractor are traits injected through
//!   [`PipelineBuilder`], so tests run without the network
//! - Filters are copy-on-write snapshots; updates are validated before they apply
//! - Per-URL failures and filter decisions are data, never errors
//!
//! ## Security
//!
//! - No network listeners; this is a library, not a server
//! - Search queries are logged only at trace/debug level
//! - Response bodies are capped before they are buffered

pub mod cache;
pub mod config;
pub mod content;
pub mod engine;
pub mod engines;
pub mod error;
pub mod fetcher;
pub mod filters;
pub mod http;
pub mod pipeline;
pub mod types;
pub mod url_normalize;

pub use cache::{CacheBackend, CacheStats, Fingerprint, NoopBackend, RedisBackend, TieredCache};
pub use config::ResearchConfig;
pub use content::{Extracted, Extractor, HtmlExtractor};
pub use engine::SearchBackend;
pub use error::{ResearchError, Result};
pub use fetcher::{FetchFailure, FetchedPage, HttpFetcher, PageFetcher};
pub use filters::{FilterLists, FilterSet, FilterSnapshot, FilterUpdate, UpdateMode};
pub use pipeline::{PipelineBuilder, ResearchPipeline, ResearchProgress};
pub use types::{
    FetchErrorKind, FetchOutcome, FilterReason, OutputFormat, ResearchOptions, ResearchResult,
    ResearchStats, SearchResult, MAX_FETCH_TIMEOUT, MAX_REQUEST_DEADLINE,
};

/// Research a query with a pipeline built from `config`.
///
/// Convenience wrapper for one-off use; long-running services should build a
/// [`ResearchPipeline`] once and share it so the cache and connection pool
/// are reused.
///
/// # Errors
///
/// Returns [`ResearchError::Config`] for invalid configuration and
/// [`ResearchError::SearchUnavailable`] when the search backend fails.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> research_core::Result<()> {
/// let config = research_core::ResearchConfig::default();
/// let result = research_core::research("rust async runtimes", &config).await?;
/// for outcome in result.successes() {
///     println!("{}", outcome.url());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn research(query: &str, config: &ResearchConfig) -> Result<ResearchResult> {
    let pipeline = ResearchPipeline::builder(config.clone()).build().await?;
    pipeline.research(query, &config.default_options()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn research_validates_config_zero_concurrency() {
        let mut config = ResearchConfig::default();
        config.research.concurrency = 0;
        let err = research("test", &config).await.unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[tokio::test]
    async fn research_validates_config_zero_cache() {
        let mut config = ResearchConfig::default();
        config.cache.max_entries = 0;
        let err = research("test", &config).await.unwrap_err();
        assert!(err.to_string().contains("max_entries"));
    }
}
