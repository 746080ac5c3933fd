//! Two-tier result cache.
//!
//! The fast tier is a bounded, strict-LRU map in process memory. The slow
//! tier is any [`CacheBackend`] (Redis in production, [`NoopBackend`] when
//! none is configured). Lookups try the fast tier first and write slow-tier
//! hits back into it; inserts write through to both. Slow-tier failures,
//! including operations that outlive the slow-tier timeout, are logged and
//! counted, never returned.

mod backend;
mod key;
mod memory;
mod remote;

pub use backend::{CacheBackend, NoopBackend};
pub use key::{normalize_query, Fingerprint};
pub use remote::RedisBackend;

use crate::config::CacheConfig;
use crate::error::{ResearchError, Result};
use crate::types::{FetchOutcome, ResearchResult};
use memory::MemoryTier;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::future::Future;
use std::time::{Duration, Instant};

/// Slow-tier operation bound used unless configured otherwise.
const DEFAULT_SLOW_TIMEOUT: Duration = Duration::from_millis(500);

/// A value stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    Research(ResearchResult),
    Page(FetchOutcome),
}

/// Which tiers are configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPresence {
    pub fast: bool,
    pub slow: bool,
}

/// Cache counters and occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered by either tier.
    pub hits: u64,
    pub misses: u64,
    /// Hits answered by the slow tier after a fast-tier miss.
    pub slow_hits: u64,
    /// Fast-tier entries dropped to make room.
    pub evictions: u64,
    /// Fast-tier entries found expired on access.
    pub expirations: u64,
    /// Slow-tier operations that failed (including undecodable values).
    pub backend_errors: u64,
    /// Entries currently in the fast tier.
    pub size: usize,
    /// Fast-tier capacity.
    pub capacity: usize,
    pub tier_presence: TierPresence,
}

/// The cache shared by every request of a pipeline.
pub struct TieredCache {
    fast: Mutex<MemoryTier>,
    slow: Arc<dyn CacheBackend>,
    slow_ttl: Duration,
    slow_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    slow_hits: AtomicU64,
    backend_errors: AtomicU64,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("slow", &self.slow.name())
            .field("slow_ttl", &self.slow_ttl)
            .field("slow_timeout", &self.slow_timeout)
            .finish_non_exhaustive()
    }
}

impl TieredCache {
    /// Build a cache from explicit tiers.
    pub fn new(
        capacity: usize,
        fast_ttl: Duration,
        slow: Arc<dyn CacheBackend>,
        slow_ttl: Duration,
    ) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| ResearchError::Config("cache capacity must be greater than 0".into()))?;
        Ok(Self {
            fast: Mutex::new(MemoryTier::new(capacity, fast_ttl)),
            slow,
            slow_ttl,
            slow_timeout: DEFAULT_SLOW_TIMEOUT,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            slow_hits: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
        })
    }

    /// Bound every slow-tier operation by `timeout`.
    pub fn with_slow_timeout(mut self, timeout: Duration) -> Self {
        self.slow_timeout = timeout;
        self
    }

    /// A cache without a shared tier.
    pub fn memory_only(capacity: usize, ttl: Duration) -> Result<Self> {
        Self::new(capacity, ttl, Arc::new(NoopBackend), Duration::ZERO)
    }

    /// Build a cache from configuration.
    ///
    /// When a remote URL is configured but the connection fails, the cache
    /// starts memory-only and logs a warning.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let slow: Arc<dyn CacheBackend> = match config.remote_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                match RedisBackend::connect(url, config.key_prefix.clone(), config.remote_timeout())
                    .await
                {
                    Ok(backend) => {
                        tracing::info!("shared cache tier connected");
                        Arc::new(backend)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "shared cache tier unavailable; running memory-only");
                        Arc::new(NoopBackend)
                    }
                }
            }
            _ => Arc::new(NoopBackend),
        };
        Ok(Self::new(
            config.max_entries,
            config.memory_ttl(),
            slow,
            config.remote_ttl(),
        )?
        .with_slow_timeout(config.remote_timeout()))
    }

    /// Look up a fingerprint in the fast tier, then the slow tier.
    pub async fn get(&self, key: &Fingerprint) -> Option<CachedValue> {
        if let Some(value) = self.lock_fast().get_at(key.as_str(), Instant::now()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %key, "fast tier hit");
            return Some(value);
        }
        if !self.slow.is_enabled() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let bytes = match self.bounded(self.slow.get(key.as_str())).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                self.record_backend_error("get", &e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match serde_json::from_slice::<CachedValue>(&bytes) {
            Ok(value) => {
                self.lock_fast()
                    .insert_at(key.as_str().to_owned(), value.clone(), Instant::now());
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.slow_hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %key, "slow tier hit");
                Some(value)
            }
            Err(e) => {
                self.record_backend_error("decode", &ResearchError::CacheBackend(e.to_string()));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value in the fast tier and write it through to the slow tier.
    pub async fn put(&self, key: &Fingerprint, value: CachedValue) {
        let encoded = if self.slow.is_enabled() {
            match serde_json::to_vec(&value) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode cache value");
                    None
                }
            }
        } else {
            None
        };

        self.lock_fast()
            .insert_at(key.as_str().to_owned(), value, Instant::now());

        if let Some(bytes) = encoded {
            if let Err(e) = self
                .bounded(self.slow.put(key.as_str(), bytes, self.slow_ttl))
                .await
            {
                self.record_backend_error("put", &e);
            }
        }
    }

    /// Empty both tiers and reset the counters.
    pub async fn clear(&self) {
        self.lock_fast().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.slow_hits.store(0, Ordering::Relaxed);
        self.backend_errors.store(0, Ordering::Relaxed);
        if let Err(e) = self.bounded(self.slow.clear()).await {
            self.record_backend_error("clear", &e);
        }
        tracing::info!("cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let fast = self.lock_fast();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            slow_hits: self.slow_hits.load(Ordering::Relaxed),
            evictions: fast.evictions(),
            expirations: fast.expirations(),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            size: fast.len(),
            capacity: fast.capacity(),
            tier_presence: TierPresence {
                fast: true,
                slow: self.slow.is_enabled(),
            },
        }
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.slow_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(ResearchError::CacheBackend(format!(
                "no answer within {} ms",
                self.slow_timeout.as_millis()
            ))),
        }
    }

    fn lock_fast(&self) -> std::sync::MutexGuard<'_, MemoryTier> {
        self.fast.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_backend_error(&self, op: &'static str, error: &ResearchError) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(backend = self.slow.name(), op, error = %error, "slow cache tier failed");
    }
}
