//! The search backend seam.
//!
//! The pipeline only needs an ordered candidate list for a query. The
//! production implementation is [`crate::engines::DuckDuckGoEngine`]; tests
//! inject their own.

use crate::error::Result;
use crate::types::SearchResult;
use async_trait::async_trait;

/// A source of ranked candidate URLs.
///
/// Implementations return at most `max_results` candidates in the backend's
/// ranking order and fail with [`crate::ResearchError::SearchUnavailable`]
/// when the backend cannot be queried.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}
