//! Tracing subscriber setup.
//!
//! All output goes to stderr: the host bridge reserves stdout for the JSON
//! protocol and the CLI for results.

use crate::error::{Result, ServiceError};
use tracing_subscriber::EnvFilter;

/// Filter directive for `level`: our crates at `level`, dependencies at `warn`.
#[must_use]
pub fn default_directive(level: &str) -> String {
    format!("warn,web_research={level},research_core={level}")
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// # Errors
///
/// Returns [`ServiceError::Config`] when a subscriber is already installed.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| ServiceError::Config(format!("failed to install tracing subscriber: {e}")))
}
