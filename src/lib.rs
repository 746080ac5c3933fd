//! web-research: concurrent web research as a tool host and CLI.
//!
//! This crate wraps the [`research_core`] pipeline with the pieces a
//! deployable service needs:
//!
//! - **Configuration**: TOML file plus environment overrides ([`config`])
//! - **Logging**: `tracing` to stderr, filtered by level or `RUST_LOG` ([`logging`])
//! - **Formatting**: JSON, raw text, markdown and NDJSON renderings ([`format`])
//! - **Prompts**: the research report synthesis template ([`prompts`])
//! - **Host**: newline-delimited JSON commands over stdin/stdout ([`host`])

pub mod app_dirs;
pub mod config;
pub mod error;
pub mod format;
pub mod host;
pub mod logging;
pub mod prompts;

pub use config::ServiceConfig;
pub use error::{Result, ServiceError};

use research_core::{FilterSet, ResearchPipeline};
use std::sync::Arc;

/// Build the research pipeline described by `config`, seeding the filter
/// set from its `[filters]` table.
///
/// # Errors
///
/// Returns an error for invalid configuration or filter patterns.
pub async fn build_pipeline(config: &ServiceConfig) -> Result<ResearchPipeline> {
    let filters = Arc::new(FilterSet::new(config.filters.clone())?);
    let pipeline = ResearchPipeline::builder(config.core())
        .filters(filters)
        .build()
        .await?;
    Ok(pipeline)
}
