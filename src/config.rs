//! Service configuration: a TOML file plus environment overrides.
//!
//! ```toml
//! [cache]
//! max_entries = 256
//! remote_url = "redis://127.0.0.1/"
//!
//! [research]
//! concurrency = 10
//!
//! [filters]
//! blocked_domains = ["example.com"]
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Tables that are omitted keep their defaults. After the file is read,
//! the environment variables listed in [`ENV_OVERRIDES`] take precedence.

use crate::error::{Result, ServiceError};
use research_core::config::{CacheConfig, FetchConfig, RequestDefaults, SearchConfig};
use research_core::{FilterLists, ResearchConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variables consulted by [`ServiceConfig::apply_env_overrides`].
pub const ENV_OVERRIDES: &[&str] = &[
    "CACHE_TTL_MEM",
    "CACHE_MAX_SIZE",
    "CACHE_TTL_REMOTE",
    "CACHE_REMOTE_URL",
    "FETCH_CONCURRENCY",
    "FETCH_TIMEOUT",
    "FETCH_RETRIES",
    "LOG_LEVEL",
];

/// Top-level configuration for the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub search: SearchConfig,
    /// Per-request defaults.
    pub research: RequestDefaults,
    /// Initial filter lists; runtime updates do not write back here.
    pub filters: FilterLists,
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this service's own crates (`error`..`trace`). `RUST_LOG`
    /// overrides it entirely.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, the default config file is
    /// read when present and defaults are used otherwise. Environment
    /// overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_config_path();
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!(path = %default_path.display(), "no config file; using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file path (`config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Empty values are ignored, except `CACHE_REMOTE_URL` where an empty
    /// value disables the remote tier.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] naming the variable when a numeric
    /// value does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_env(&lookup, "CACHE_TTL_MEM")? {
            self.cache.memory_ttl_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "CACHE_MAX_SIZE")? {
            self.cache.max_entries = v;
        }
        if let Some(v) = parse_env(&lookup, "CACHE_TTL_REMOTE")? {
            self.cache.remote_ttl_secs = v;
        }
        if let Some(url) = lookup("CACHE_REMOTE_URL") {
            let url = url.trim();
            self.cache.remote_url = (!url.is_empty()).then(|| url.to_owned());
        }
        if let Some(v) = parse_env(&lookup, "FETCH_CONCURRENCY")? {
            self.research.concurrency = v;
        }
        if let Some(v) = parse_env(&lookup, "FETCH_TIMEOUT")? {
            self.fetch.timeout_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "FETCH_RETRIES")? {
            self.fetch.max_retries = v;
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            self.logging.level = level.trim().to_ascii_lowercase();
        }
        Ok(())
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.core().validate()?;
        if !matches!(
            self.logging.level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace" | "off"
        ) {
            return Err(ServiceError::Config(format!(
                "logging.level must be one of error, warn, info, debug, trace, off (got {:?})",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// The subset of configuration consumed by the research pipeline.
    pub fn core(&self) -> ResearchConfig {
        ResearchConfig {
            cache: self.cache.clone(),
            fetch: self.fetch.clone(),
            search: self.search.clone(),
            research: self.research.clone(),
        }
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| ServiceError::Config(format!("{key} must be a non-negative integer (got {raw:?})")))
}
