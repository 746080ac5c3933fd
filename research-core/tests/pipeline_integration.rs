//! Integration tests for the research pipeline.
//!
//! Search is always a scripted in-test backend. Fetching is either a scripted
//! fetcher with per-URL delays or the real HTTP fetcher against a wiremock
//! server, so no test touches the public network.

use async_trait::async_trait;
use research_core::{
    CacheBackend, FetchErrorKind, FetchFailure, FetchOutcome, FetchedPage, FilterReason, HttpFetcher, FilterSet,
    FilterUpdate, PageFetcher, ResearchConfig, ResearchError, ResearchOptions, ResearchPipeline,
    ResearchProgress, SearchBackend, SearchResult, TieredCache,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = "<html><head><title>Async Rust</title></head><body><article>\
    <p>Tokio is an asynchronous runtime for the Rust programming language.</p>\
    <p>It provides the building blocks needed for writing network applications.</p>\
    </article></body></html>";

struct ScriptedSearch {
    results: Vec<SearchResult>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    fn new(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            results: urls
                .iter()
                .enumerate()
                .map(|(i, url)| SearchResult::new(*url, format!("Result {i}")))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn search(&self, _query: &str, max_results: usize) -> research_core::Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

struct FailingSearch;

#[async_trait]
impl SearchBackend for FailingSearch {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn search(&self, _query: &str, _max_results: usize) -> research_core::Result<Vec<SearchResult>> {
        Err(ResearchError::SearchUnavailable("connection refused".into()))
    }
}

#[derive(Clone)]
enum Script {
    Page { delay_ms: u64, body: String },
    Fail(FetchErrorKind),
    /// Waits until the shared gate is opened.
    Gated(String),
}

#[derive(Default)]
struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Notify,
    started: Notify,
    order: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn with(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_owned(), script);
        self
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        _timeout: Duration,
        _max_retries: u32,
    ) -> Result<FetchedPage, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let script = self
            .scripts
            .get(url)
            .cloned()
            .unwrap_or(Script::Fail(FetchErrorKind::HttpStatus(404)));
        let result = match script {
            Script::Page { delay_ms, body } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(page(url, body))
            }
            Script::Fail(kind) => Err(FetchFailure::new(kind, "scripted failure")),
            Script::Gated(body) => {
                self.started.notify_one();
                self.gate.notified().await;
                Ok(page(url, body))
            }
        };

        self.order.lock().unwrap().push(url.to_owned());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn page(url: &str, body: String) -> FetchedPage {
    FetchedPage {
        requested_url: url.to_owned(),
        final_url: url.to_owned(),
        status: 200,
        content_type: Some("text/html".into()),
        body,
    }
}

fn article(delay_ms: u64) -> Script {
    Script::Page {
        delay_ms,
        body: ARTICLE.to_owned(),
    }
}

fn options() -> ResearchOptions {
    ResearchOptions {
        min_content_chars: 20,
        max_retries: 0,
        fetch_timeout: Duration::from_secs(5),
        request_deadline: Duration::from_secs(10),
        ..Default::default()
    }
}

async fn pipeline(search: Arc<dyn SearchBackend>, fetcher: Arc<dyn PageFetcher>) -> ResearchPipeline {
    ResearchPipeline::builder(ResearchConfig::default())
        .search_backend(search)
        .fetcher(fetcher)
        .cache(Arc::new(
            TieredCache::memory_only(64, Duration::from_secs(60)).expect("cache"),
        ))
        .build()
        .await
        .expect("pipeline")
}

fn http_fetcher() -> Arc<dyn PageFetcher> {
    Arc::new(HttpFetcher::new(Default::default()).expect("fetcher"))
}

fn urls(outcomes: &[FetchOutcome]) -> Vec<&str> {
    outcomes.iter().map(FetchOutcome::url).collect()
}

#[tokio::test]
async fn outcomes_follow_search_order_not_completion_order() {
    let (a, b, c) = ("https://a.example/1", "https://b.example/2", "https://c.example/3");
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .with(a, article(150))
            .with(b, article(0))
            .with(c, article(100)),
    );
    let pipeline = pipeline(ScriptedSearch::new(&[a, b, c]), fetcher.clone()).await;

    let result = pipeline.research("order", &options()).await.expect("research");

    assert_eq!(urls(&result.outcomes), vec![a, b, c]);
    assert!(result.outcomes.iter().all(FetchOutcome::is_success));
    // B really did finish first.
    assert_eq!(fetcher.order.lock().unwrap()[0], b);
}

#[tokio::test]
async fn partial_failure_keeps_every_outcome() {
    let blocked = "https://www.reddit.com/r/rust";
    let slow = "https://slow.example/page";
    let good = "https://good.example/page";
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .with(slow, Script::Fail(FetchErrorKind::Timeout))
            .with(good, article(0)),
    );
    let pipeline = pipeline(ScriptedSearch::new(&[blocked, slow, good]), fetcher.clone()).await;

    let result = pipeline.research("partial", &options()).await.expect("research");

    assert_eq!(result.outcomes.len(), 3);
    assert!(matches!(
        result.outcomes[0],
        FetchOutcome::Filtered { reason: FilterReason::PreFetchDomain, .. }
    ));
    assert!(matches!(
        result.outcomes[1],
        FetchOutcome::Failed { error_kind: FetchErrorKind::Timeout, .. }
    ));
    assert!(result.outcomes[2].is_success());
    assert_eq!(result.stats.filtered, 1);
    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.stats.succeeded, 1);
    assert_eq!(result.stats.searched, 3);
    assert_eq!(result.stats.dispatched, 2);
    // The blocked URL was never fetched.
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guide"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/guide", server.uri());
    let search = ScriptedSearch::new(&[url.as_str()]);
    let pipeline = ResearchPipeline::builder(ResearchConfig::default())
        .search_backend(search.clone())
        .cache(Arc::new(
            TieredCache::memory_only(16, Duration::from_secs(60)).expect("cache"),
        ))
        .build()
        .await
        .expect("pipeline");

    let first = pipeline.research("tokio guide", &options()).await.expect("first");
    let second = pipeline.research("  Tokio   GUIDE ", &options()).await.expect("second");

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.outcomes, second.outcomes);
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    let stats = pipeline.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn least_recently_used_result_is_evicted() {
    let url = "https://lru.example/";
    let search = ScriptedSearch::new(&[url]);
    let fetcher = Arc::new(ScriptedFetcher::default().with(url, article(0)));
    let pipeline = ResearchPipeline::builder(ResearchConfig::default())
        .search_backend(search.clone())
        .fetcher(fetcher)
        .cache(Arc::new(
            TieredCache::memory_only(2, Duration::from_secs(60)).expect("cache"),
        ))
        .build()
        .await
        .expect("pipeline");

    for query in ["one", "two", "three"] {
        pipeline.research(query, &options()).await.expect("research");
    }
    assert_eq!(pipeline.cache_stats().size, 2);
    assert_eq!(pipeline.cache_stats().evictions, 1);

    let again = pipeline.research("three", &options()).await.expect("research");
    assert!(again.cached);
    let evicted = pipeline.research("one", &options()).await.expect("research");
    assert!(!evicted.cached);
    assert_eq!(search.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn expired_result_is_researched_again() {
    let url = "https://ttl.example/";
    let search = ScriptedSearch::new(&[url]);
    let fetcher = Arc::new(ScriptedFetcher::default().with(url, article(0)));
    let pipeline = ResearchPipeline::builder(ResearchConfig::default())
        .search_backend(search.clone())
        .fetcher(fetcher)
        .cache(Arc::new(
            TieredCache::memory_only(8, Duration::from_millis(100)).expect("cache"),
        ))
        .build()
        .await
        .expect("pipeline");

    pipeline.research("ttl", &options()).await.expect("research");
    tokio::time::sleep(Duration::from_millis(250)).await;
    let later = pipeline.research("ttl", &options()).await.expect("research");

    assert!(!later.cached);
    assert_eq!(search.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn filter_update_affects_only_later_requests() {
    let docs = "https://docs.example.org/guide";
    let fetcher = Arc::new(ScriptedFetcher::default().with(docs, Script::Gated(ARTICLE.to_owned())));
    let pipeline = Arc::new(pipeline(ScriptedSearch::new(&[docs]), fetcher.clone()).await);

    let in_flight = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.research("docs", &options()).await })
    };
    // Wait until the fetch has been dispatched, then block the domain.
    fetcher.started.notified().await;
    pipeline
        .update_filters(FilterUpdate {
            blocked_domains: Some(vec!["example.org".into()]),
            ..Default::default()
        })
        .expect("valid update");
    fetcher.gate.notify_one();

    let earlier = in_flight.await.expect("join").expect("research");
    assert!(earlier.outcomes[0].is_success());

    let later = pipeline.research("docs", &options()).await.expect("research");
    assert!(!later.cached, "filter change must not reuse the stale result");
    assert!(matches!(
        later.outcomes[0],
        FetchOutcome::Filtered { reason: FilterReason::PreFetchDomain, .. }
    ));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn request_deadline_abandons_outstanding_fetches() {
    let fast = "https://fast.example/a";
    let stuck = "https://stuck.example/b";
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .with(fast, article(0))
            .with(stuck, article(5_000)),
    );
    let pipeline = pipeline(ScriptedSearch::new(&[stuck, fast]), fetcher).await;
    let options = ResearchOptions {
        request_deadline: Duration::from_millis(300),
        ..options()
    };

    let started = std::time::Instant::now();
    let result = pipeline.research("deadline", &options).await.expect("research");

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(
        result.outcomes[0],
        FetchOutcome::Failed { error_kind: FetchErrorKind::Timeout, .. }
    ));
    assert!(result.outcomes[1].is_success());
}

#[tokio::test]
async fn concurrency_is_bounded_per_request() {
    let candidates: Vec<String> = (0..8).map(|i| format!("https://site{i}.example/p")).collect();
    let mut fetcher = ScriptedFetcher::default();
    for url in &candidates {
        fetcher = fetcher.with(url, article(40));
    }
    let fetcher = Arc::new(fetcher);
    let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
    let pipeline = pipeline(ScriptedSearch::new(&refs), fetcher.clone()).await;
    let options = ResearchOptions {
        concurrency: 2,
        ..options()
    };

    let result = pipeline.research("bounded", &options).await.expect("research");

    assert_eq!(result.stats.succeeded, 8);
    assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn challenge_pages_are_filtered_after_fetch() {
    let url = "https://guarded.example/";
    let body = "<html><body><p>Please verify you are human before continuing to this site.</p></body></html>";
    let fetcher = Arc::new(ScriptedFetcher::default().with(
        url,
        Script::Page {
            delay_ms: 0,
            body: body.to_owned(),
        },
    ));
    let pipeline = pipeline(ScriptedSearch::new(&[url]), fetcher).await;

    let result = pipeline.research("guarded", &options()).await.expect("research");
    assert!(matches!(
        result.outcomes[0],
        FetchOutcome::Filtered { reason: FilterReason::PostFetchContent, .. }
    ));
}

#[tokio::test]
async fn thin_pages_fail_as_too_short() {
    let url = "https://thin.example/";
    let fetcher = Arc::new(ScriptedFetcher::default().with(url, article(0)));
    let pipeline = pipeline(ScriptedSearch::new(&[url]), fetcher).await;
    let options = ResearchOptions {
        min_content_chars: 5_000,
        max_content_chars: 10_000,
        ..options()
    };

    let result = pipeline.research("thin", &options).await.expect("research");
    assert!(matches!(
        result.outcomes[0],
        FetchOutcome::Failed { error_kind: FetchErrorKind::ContentTooShort, .. }
    ));
}

#[tokio::test]
async fn long_pages_are_truncated() {
    let url = "https://long.example/";
    let body = format!("<html><body><p>{}</p></body></html>", "lorem ipsum dolor sit amet ".repeat(200));
    let fetcher = Arc::new(ScriptedFetcher::default().with(url, Script::Page { delay_ms: 0, body }));
    let pipeline = pipeline(ScriptedSearch::new(&[url]), fetcher).await;
    let options = ResearchOptions {
        max_content_chars: 100,
        ..options()
    };

    let result = pipeline.research("long", &options).await.expect("research");
    match &result.outcomes[0] {
        FetchOutcome::Success { extracted_text, .. } => {
            assert!(extracted_text.ends_with("[Content truncated]"));
            assert!(extracted_text.chars().count() <= 100 + "\n\n[Content truncated]".len());
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn search_failure_aborts_the_request() {
    let pipeline = pipeline(Arc::new(FailingSearch), Arc::new(ScriptedFetcher::default())).await;
    let err = pipeline.research("anything", &options()).await.unwrap_err();
    assert!(matches!(err, ResearchError::SearchUnavailable(_)));
}

#[tokio::test]
async fn empty_candidate_list_is_search_unavailable() {
    let pipeline = pipeline(ScriptedSearch::new(&[]), Arc::new(ScriptedFetcher::default())).await;
    let err = pipeline.research("nothing", &options()).await.unwrap_err();
    assert!(err.to_string().contains("no candidates"));
}

#[tokio::test]
async fn progress_reports_every_outcome() {
    let (a, b) = ("https://a.example/", "https://www.youtube.com/watch");
    let fetcher = Arc::new(ScriptedFetcher::default().with(a, article(0)));
    let pipeline = pipeline(ScriptedSearch::new(&[a, b]), fetcher).await;

    let events = Mutex::new(Vec::new());
    let record = |event: ResearchProgress| events.lock().unwrap().push(event);
    pipeline
        .research_with_progress("progress", &options(), &record)
        .await
        .expect("research");

    let events = events.into_inner().unwrap();
    assert!(matches!(
        events.first(),
        Some(ResearchProgress::Started { candidates: 2, dispatched: 1 })
    ));
    let outcome_count = events
        .iter()
        .filter(|e| matches!(e, ResearchProgress::Outcome { .. }))
        .count();
    assert_eq!(outcome_count, 2);
    assert!(matches!(
        events.last(),
        Some(ResearchProgress::Finished { cached: false, .. })
    ));
}

#[tokio::test]
async fn fetch_page_uses_lenient_minimum_and_caches_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(ScriptedSearch::new(&[]), http_fetcher()).await;
    let url = format!("{}/short", server.uri());

    let first = pipeline.fetch_page(&url, &pipeline.page_options()).await.expect("fetch");
    let second = pipeline.fetch_page(&url, &pipeline.page_options()).await.expect("fetch");

    match &first {
        FetchOutcome::Success { title, word_count, .. } => {
            assert_eq!(title, "Async Rust");
            assert!(*word_count > 10);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(first, second);
}

#[tokio::test]
async fn fetch_page_reports_filtered_and_malformed_urls() {
    let pipeline = pipeline(ScriptedSearch::new(&[]), http_fetcher()).await;

    let filtered = pipeline
        .fetch_page("https://example.com/report.pdf", &pipeline.page_options())
        .await
        .expect("fetch");
    assert!(matches!(
        filtered,
        FetchOutcome::Filtered { reason: FilterReason::PreFetchPattern, .. }
    ));

    let malformed = pipeline
        .fetch_page("not a url", &pipeline.page_options())
        .await
        .expect("fetch");
    assert!(matches!(
        malformed,
        FetchOutcome::Failed { error_kind: FetchErrorKind::MalformedUrl, .. }
    ));
}

#[tokio::test]
async fn search_drops_filtered_candidates() {
    let pipeline = pipeline(
        ScriptedSearch::new(&["https://x.com/post", "https://example.com/a", "https://example.com/cart"]),
        Arc::new(ScriptedFetcher::default()),
    )
    .await;
    let results = pipeline.search("q", 10).await.expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "https://example.com/a");
}

#[test]
fn snapshots_never_mix_components_of_one_update() {
    let set = Arc::new(FilterSet::with_defaults().expect("defaults"));
    let writer = {
        let set = Arc::clone(&set);
        std::thread::spawn(move || {
            for i in 0..500 {
                set.replace(FilterUpdate {
                    blocked_domains: Some(vec![format!("d{i}.example")]),
                    blocked_content_markers: Some(vec![format!("marker {i}")]),
                    ..Default::default()
                })
                .expect("valid update");
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let set = Arc::clone(&set);
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    let lists = set.snapshot().lists();
                    if lists.blocked_domains.len() == 1 && lists.blocked_content_markers.len() == 1 {
                        let domain_id = lists.blocked_domains[0].trim_start_matches('d').trim_end_matches(".example").to_owned();
                        let marker_id = lists.blocked_content_markers[0].trim_start_matches("marker ").to_owned();
                        assert_eq!(domain_id, marker_id, "observed a half-applied update");
                    } else {
                        // Still the defaults: both components untouched.
                        assert!(lists.blocked_domains.len() > 1);
                        assert!(lists.blocked_content_markers.len() > 1);
                    }
                }
            })
        })
        .collect();

    writer.join().expect("writer");
    for reader in readers {
        reader.join().expect("reader");
    }
}

#[tokio::test]
async fn global_limit_bounds_fetches_across_requests() {
    let candidates: Vec<String> = (0..6).map(|i| format!("https://shared{i}.example/p")).collect();
    let mut fetcher = ScriptedFetcher::default();
    for url in &candidates {
        fetcher = fetcher.with(url, article(40));
    }
    let fetcher = Arc::new(fetcher);
    let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();

    let mut config = ResearchConfig::default();
    config.fetch.global_concurrency = Some(2);
    let pipeline = ResearchPipeline::builder(config)
        .search_backend(ScriptedSearch::new(&refs))
        .fetcher(fetcher.clone())
        .cache(Arc::new(
            TieredCache::memory_only(64, Duration::from_secs(60)).expect("cache"),
        ))
        .build()
        .await
        .expect("pipeline");
    let options = ResearchOptions {
        concurrency: 4,
        ..options()
    };

    let (first, second) = tokio::join!(
        pipeline.research("first query", &options),
        pipeline.research("second query", &options),
    );

    assert_eq!(first.expect("first").stats.succeeded, 6);
    assert_eq!(second.expect("second").stats.succeeded, 6);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 12);
    assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 2);
}

struct StalledBackend;

#[async_trait]
impl CacheBackend for StalledBackend {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn get(&self, _key: &str) -> research_core::Result<Option<Vec<u8>>> {
        std::future::pending().await
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> research_core::Result<()> {
        std::future::pending().await
    }

    async fn clear(&self) -> research_core::Result<()> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn unresponsive_shared_tier_does_not_stall_requests() {
    let url = "https://a.example/1";
    let fetcher = Arc::new(ScriptedFetcher::default().with(url, article(0)));
    let cache = TieredCache::new(
        8,
        Duration::from_secs(60),
        Arc::new(StalledBackend),
        Duration::from_secs(60),
    )
    .expect("cache")
    .with_slow_timeout(Duration::from_millis(50));
    let pipeline = ResearchPipeline::builder(ResearchConfig::default())
        .search_backend(ScriptedSearch::new(&[url]))
        .fetcher(fetcher)
        .cache(Arc::new(cache))
        .build()
        .await
        .expect("pipeline");

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.research("stalled cache", &options()),
    )
    .await
    .expect("request finished despite the stalled tier")
    .expect("research");
    assert_eq!(result.stats.succeeded, 1);
    assert_eq!(pipeline.cache_stats().backend_errors, 2);

    let again = pipeline.research("stalled cache", &options()).await.expect("research");
    assert!(again.cached, "fast tier still serves the result");
}

#[tokio::test]
async fn oversized_durations_are_rejected_up_front() {
    let mut config = ResearchConfig::default();
    config.cache.memory_ttl_secs = u64::MAX;
    let err = ResearchPipeline::builder(config)
        .search_backend(ScriptedSearch::new(&["https://a.example/1"]))
        .fetcher(Arc::new(ScriptedFetcher::default()))
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::Config(_)));

    let pipeline = pipeline(
        ScriptedSearch::new(&["https://a.example/1"]),
        Arc::new(ScriptedFetcher::default()),
    )
    .await;
    let options = ResearchOptions {
        request_deadline: Duration::from_secs(u64::MAX),
        ..options()
    };
    let err = pipeline.research("forever", &options).await.unwrap_err();
    assert!(matches!(err, ResearchError::Config(_)));
}
