//! The shared (slow) cache tier abstraction.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A remote key/value store holding serialized cache values.
///
/// Every operation may fail; the [`super::TieredCache`] logs and counts those
/// failures but never surfaces them to callers.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this backend actually stores anything.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove every entry this backend owns.
    async fn clear(&self) -> Result<()>;
}

/// Backend used when no shared tier is configured. Stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

#[async_trait]
impl CacheBackend for NoopBackend {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
