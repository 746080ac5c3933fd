//! Redis-backed shared cache tier.

use super::backend::CacheBackend;
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;

/// Keys scanned per `SCAN` round trip when clearing.
const SCAN_BATCH: usize = 200;

/// Reconnect attempts before a connect or reconnect gives up.
const CONNECT_RETRIES: usize = 1;

/// Shared cache tier stored in Redis with per-key expiry.
///
/// All keys are namespaced with a prefix so [`CacheBackend::clear`] only
/// removes entries written by this service.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    prefix: String,
}

impl RedisBackend {
    /// Connect to `url`. The connection manager reconnects on its own after
    /// transient failures. `timeout` bounds each connection attempt and each
    /// command's response.
    pub async fn connect(url: &str, prefix: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ResearchError::CacheBackend(format!("invalid redis url: {e}")))?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(timeout)
            .set_response_timeout(timeout)
            .set_number_of_retries(CONNECT_RETRIES);
        let connection = ConnectionManager::new_with_config(client, config)
            .await
            .map_err(|e| ResearchError::CacheBackend(format!("failed to connect to redis: {e}")))?;
        Ok(Self {
            connection,
            prefix: prefix.into(),
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        conn.get(self.make_key(key))
            .await
            .map_err(|e| ResearchError::CacheBackend(format!("GET failed: {e}")))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(self.make_key(key), value, seconds)
            .await
            .map_err(|e| ResearchError::CacheBackend(format!("SET failed: {e}")))?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.prefix);
        let mut cursor = 0u64;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| ResearchError::CacheBackend(format!("SCAN failed: {e}")))?;
            if !keys.is_empty() {
                removed += keys.len();
                let _: () = conn
                    .del(keys)
                    .await
                    .map_err(|e| ResearchError::CacheBackend(format!("DEL failed: {e}")))?;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        tracing::debug!(removed, prefix = %self.prefix, "cleared redis cache tier");
        Ok(())
    }
}
