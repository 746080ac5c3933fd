//! The research pipeline: search, filter, fetch concurrently, extract, cache.
//!
//! One [`ResearchPipeline`] serves many concurrent requests. The only state
//! shared between them is the [`FilterSet`], the [`TieredCache`] and the
//! optional global fetch limiter; all three are owned here and injected
//! through [`PipelineBuilder`].
//!
//! Per request, candidates move through
//! `Discovered -> PreFilterChecked -> {Skipped | Dispatched} -> {Fetched | FetchFailed}
//! -> PostFilterChecked -> {Extracted | ContentFiltered} -> Finalized`.
//! Fetch tasks are spawned in search order and joined in search order against
//! one absolute deadline, so completion order never leaks into the result.

use crate::cache::{CacheStats, CachedValue, Fingerprint, TieredCache};
use crate::config::ResearchConfig;
use crate::content::{truncate_to_limit, Extractor, HtmlExtractor};
use crate::engine::SearchBackend;
use crate::engines::DuckDuckGoEngine;
use crate::error::{ResearchError, Result};
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::filters::{FilterSet, FilterSnapshot, FilterUpdate};
use crate::types::{
    FetchErrorKind, FetchOutcome, FilterReason, ResearchOptions, ResearchResult, ResearchStats,
    SearchResult, MAX_REQUEST_DEADLINE,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::timeout_at;

/// Progress notifications emitted while a research request runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ResearchProgress {
    /// Candidates were retrieved and pre-filtered.
    Started {
        candidates: usize,
        dispatched: usize,
    },
    /// The outcome for candidate `index` (search order) was recorded.
    Outcome {
        index: usize,
        total: usize,
        outcome: FetchOutcome,
    },
    /// The request finished (possibly from cache).
    Finished { stats: ResearchStats, cached: bool },
}

/// Callback receiving [`ResearchProgress`] events.
pub type ProgressFn<'a> = &'a (dyn Fn(ResearchProgress) + Send + Sync);

/// Builder for [`ResearchPipeline`]. Components not supplied are built from
/// the configuration.
pub struct PipelineBuilder {
    config: ResearchConfig,
    search: Option<Arc<dyn SearchBackend>>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    extractor: Option<Arc<dyn Extractor>>,
    filters: Option<Arc<FilterSet>>,
    cache: Option<Arc<TieredCache>>,
}

impl PipelineBuilder {
    pub fn new(config: ResearchConfig) -> Self {
        Self {
            config,
            search: None,
            fetcher: None,
            extractor: None,
            filters: None,
            cache: None,
        }
    }

    pub fn search_backend(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn filters(mut self, filters: Arc<FilterSet>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate the configuration and assemble the pipeline.
    ///
    /// Connects to the shared cache tier when one is configured.
    pub async fn build(self) -> Result<ResearchPipeline> {
        let config = self.config;
        config.validate()?;

        let search: Arc<dyn SearchBackend> = match self.search {
            Some(search) => search,
            None => Arc::new(DuckDuckGoEngine::new(&config.search)?),
        };
        let fetcher: Arc<dyn PageFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(config.fetch.clone())?),
        };
        let filters = match self.filters {
            Some(filters) => filters,
            None => Arc::new(FilterSet::with_defaults()?),
        };
        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(TieredCache::from_config(&config.cache).await?),
        };
        let global_limit = config
            .fetch
            .global_concurrency
            .map(|permits| Arc::new(Semaphore::new(permits)));

        Ok(ResearchPipeline {
            search,
            fetcher,
            extractor: self.extractor.unwrap_or_else(|| Arc::new(HtmlExtractor)),
            filters,
            cache,
            global_limit,
            config,
        })
    }
}

/// Search-fetch-extract pipeline with a shared cache and filter set.
pub struct ResearchPipeline {
    search: Arc<dyn SearchBackend>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    filters: Arc<FilterSet>,
    cache: Arc<TieredCache>,
    global_limit: Option<Arc<Semaphore>>,
    config: ResearchConfig,
}

impl std::fmt::Debug for ResearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchPipeline")
            .field("search", &self.search.name())
            .field("cache", &self.cache)
            .field("global_limit", &self.global_limit.as_ref().map(|s| s.available_permits()))
            .finish_non_exhaustive()
    }
}

impl ResearchPipeline {
    pub fn builder(config: ResearchConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Options for [`Self::research`] seeded from the configuration.
    pub fn default_options(&self) -> ResearchOptions {
        self.config.default_options()
    }

    /// Options for [`Self::fetch_page`] seeded from the configuration.
    pub fn page_options(&self) -> ResearchOptions {
        self.config.page_options()
    }

    /// Query the search backend and drop candidates the current filters exclude.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let query = non_empty_query(query)?;
        let filters = self.filters.snapshot();
        let candidates = self.search.search(query, max_results).await.map_err(as_unavailable)?;
        Ok(candidates
            .into_iter()
            .take(max_results)
            .filter(|c| pre_filter(&filters, &c.url).is_none())
            .collect())
    }

    /// Run the single-URL path: pre-filter, fetch, extract, post-filter.
    ///
    /// Per-URL problems are reported in the returned outcome; only invalid
    /// options are errors. `Success` outcomes are cached under a page
    /// fingerprint.
    pub async fn fetch_page(&self, url: &str, options: &ResearchOptions) -> Result<FetchOutcome> {
        options.validate()?;
        let url = url.trim();
        let filters = self.filters.snapshot();
        if let Some(reason) = pre_filter(&filters, url) {
            tracing::debug!(url, %reason, "page filtered before fetch");
            return Ok(FetchOutcome::filtered(url, reason));
        }

        let key = Fingerprint::page(url, options, filters.content_hash());
        if options.use_cache {
            if let Some(CachedValue::Page(outcome)) = self.cache.get(&key).await {
                tracing::debug!(url, "page served from cache");
                return Ok(outcome);
            }
        }

        let _global = match &self.global_limit {
            Some(limit) => match Arc::clone(limit).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return Ok(limiter_closed(url)),
            },
            None => None,
        };
        let outcome = process_url(
            self.fetcher.as_ref(),
            self.extractor.as_ref(),
            &filters,
            url,
            "",
            options,
        )
        .await;

        if options.use_cache && outcome.is_success() {
            self.cache.put(&key, CachedValue::Page(outcome.clone())).await;
        }
        Ok(outcome)
    }

    /// Research a query without progress reporting.
    pub async fn research(&self, query: &str, options: &ResearchOptions) -> Result<ResearchResult> {
        self.research_with_progress(query, options, &|_| {}).await
    }

    /// Research a query, reporting progress through `progress`.
    ///
    /// Fails only when the options are invalid or the search backend is
    /// unavailable. Filter decisions and fetch failures are outcomes.
    pub async fn research_with_progress(
        &self,
        query: &str,
        options: &ResearchOptions,
        progress: ProgressFn<'_>,
    ) -> Result<ResearchResult> {
        options.validate()?;
        let query = non_empty_query(query)?;
        let started = Instant::now();
        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(options.request_deadline)
            .unwrap_or_else(|| now + MAX_REQUEST_DEADLINE);
        let filters = self.filters.snapshot();
        let key = Fingerprint::research(query, options, filters.content_hash());

        if options.use_cache {
            if let Some(CachedValue::Research(mut hit)) = self.cache.get(&key).await {
                hit.cached = true;
                tracing::debug!(query, "research served from cache");
                tracing::info!(outcomes = hit.outcomes.len(), "research request served from cache");
                progress(ResearchProgress::Finished {
                    stats: hit.stats.clone(),
                    cached: true,
                });
                return Ok(hit);
            }
        }

        tracing::debug!(query, max_results = options.max_results, "researching");
        let mut candidates =
            match timeout_at(deadline, self.search.search(query, options.max_results)).await {
                Ok(result) => result.map_err(as_unavailable)?,
                Err(_) => {
                    return Err(ResearchError::SearchUnavailable(
                        "search did not answer before the request deadline".into(),
                    ))
                }
            };
        if candidates.is_empty() {
            return Err(ResearchError::SearchUnavailable(
                "search returned no candidates".into(),
            ));
        }
        candidates.truncate(options.max_results);

        let total = candidates.len();
        let request_limit = Arc::new(Semaphore::new(options.concurrency));
        let mut slots: Vec<Option<FetchOutcome>> = vec![None; total];
        let mut pending = Vec::new();

        for (index, candidate) in candidates.into_iter().enumerate() {
            if let Some(reason) = pre_filter(&filters, &candidate.url) {
                tracing::debug!(url = %candidate.url, %reason, "candidate filtered before fetch");
                slots[index] = Some(FetchOutcome::filtered(candidate.url, reason));
                continue;
            }

            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let filters = Arc::clone(&filters);
            let request_limit = Arc::clone(&request_limit);
            let global_limit = self.global_limit.clone();
            let options = options.clone();
            let url = candidate.url.clone();
            let handle = tokio::spawn(async move {
                // Request permit first so a waiting request never pins global permits.
                let Ok(_request) = request_limit.acquire_owned().await else {
                    return limiter_closed(&candidate.url);
                };
                let _global = match global_limit {
                    Some(limit) => match limit.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return limiter_closed(&candidate.url),
                    },
                    None => None,
                };
                process_url(
                    fetcher.as_ref(),
                    extractor.as_ref(),
                    &filters,
                    &candidate.url,
                    &candidate.title,
                    &options,
                )
                .await
            });
            pending.push((index, url, handle));
        }

        progress(ResearchProgress::Started {
            candidates: total,
            dispatched: pending.len(),
        });
        for (index, slot) in slots.iter().enumerate() {
            if let Some(outcome) = slot {
                progress(ResearchProgress::Outcome {
                    index,
                    total,
                    outcome: outcome.clone(),
                });
            }
        }

        let dispatched = pending.len();
        let mut abandoned = 0usize;
        for (index, url, mut handle) in pending {
            let outcome = match timeout_at(deadline, &mut handle).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_error)) => {
                    tracing::warn!(error = %join_error, "fetch task ended abnormally");
                    FetchOutcome::failed(
                        url,
                        FetchErrorKind::ConnectionError,
                        format!("fetch task failed: {join_error}"),
                    )
                }
                Err(_) => {
                    handle.abort();
                    abandoned += 1;
                    FetchOutcome::failed(
                        url,
                        FetchErrorKind::Timeout,
                        "request deadline exceeded",
                    )
                }
            };
            progress(ResearchProgress::Outcome {
                index,
                total,
                outcome: outcome.clone(),
            });
            slots[index] = Some(outcome);
        }

        let outcomes: Vec<FetchOutcome> = slots.into_iter().flatten().collect();
        let mut stats = ResearchStats::tally(&outcomes);
        stats.searched = total;
        stats.dispatched = dispatched;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        let result = ResearchResult {
            query: query.to_owned(),
            outcomes,
            stats,
            cached: false,
        };
        if options.use_cache {
            self.cache
                .put(&key, CachedValue::Research(result.clone()))
                .await;
        }

        tracing::info!(
            searched = result.stats.searched,
            dispatched,
            succeeded = result.stats.succeeded,
            filtered = result.stats.filtered,
            failed = result.stats.failed,
            abandoned,
            elapsed_ms = result.stats.elapsed_ms,
            "research request finished"
        );
        progress(ResearchProgress::Finished {
            stats: result.stats.clone(),
            cached: false,
        });
        Ok(result)
    }

    /// Atomically apply a filter update. Requests already running keep the
    /// snapshot they started with.
    pub fn update_filters(&self, update: FilterUpdate) -> Result<Arc<FilterSnapshot>> {
        self.filters.replace(update)
    }

    /// The filters new requests will use.
    pub fn filters(&self) -> Arc<FilterSnapshot> {
        self.filters.snapshot()
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn non_empty_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ResearchError::Config("query must not be empty".into()));
    }
    Ok(trimmed)
}

fn as_unavailable(error: ResearchError) -> ResearchError {
    match error {
        ResearchError::SearchUnavailable(_) => error,
        other => ResearchError::SearchUnavailable(other.to_string()),
    }
}

fn pre_filter(filters: &FilterSnapshot, url: &str) -> Option<FilterReason> {
    if filters.matches_blocked_domain(url) {
        Some(FilterReason::PreFetchDomain)
    } else if filters.matches_skip_pattern(url) {
        Some(FilterReason::PreFetchPattern)
    } else {
        None
    }
}

fn limiter_closed(url: &str) -> FetchOutcome {
    FetchOutcome::failed(url, FetchErrorKind::ConnectionError, "fetch limiter closed")
}

/// Fetch, extract and post-filter one URL.
async fn process_url(
    fetcher: &dyn PageFetcher,
    extractor: &dyn Extractor,
    filters: &FilterSnapshot,
    url: &str,
    title_hint: &str,
    options: &ResearchOptions,
) -> FetchOutcome {
    let page = match fetcher
        .fetch(url, options.fetch_timeout, options.max_retries)
        .await
    {
        Ok(page) => page,
        Err(failure) => return FetchOutcome::failed(url, failure.kind, failure.detail),
    };

    let extracted = extractor.extract(&page.body, filters.navigation_patterns());
    if filters.contains_blocked_content(&extracted.text) {
        tracing::debug!(url, "page content looks like a bot challenge");
        return FetchOutcome::filtered(url, FilterReason::PostFetchContent);
    }

    let chars = extracted.text.chars().count();
    if chars < options.min_content_chars {
        tracing::debug!(
            url,
            chars,
            content_type = page.content_type.as_deref().unwrap_or("unknown"),
            "page too short after extraction"
        );
        return FetchOutcome::failed(
            url,
            FetchErrorKind::ContentTooShort,
            format!("extracted {chars} characters, need {}", options.min_content_chars),
        );
    }

    let text = truncate_to_limit(&extracted.text, options.max_content_chars);
    let title = if extracted.title.is_empty() {
        title_hint.to_owned()
    } else {
        extracted.title
    };
    FetchOutcome::Success {
        url: url.to_owned(),
        final_url: page.final_url,
        title,
        word_count: text.split_whitespace().count(),
        extracted_text: text,
        fetched_at: Utc::now(),
    }
}
