//! Headless tool host for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` messages as newline-delimited JSON from stdin and
//! writes `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use web_research::host::{ToolHandler, run_stdio_bridge};
use web_research::{ServiceConfig, app_dirs, build_pipeline, logging};

/// Web research tool host speaking NDJSON on stdin/stdout.
#[derive(Parser)]
#[command(name = "web-research-host", version, about)]
struct Args {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "WEB_RESEARCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::load(args.config.as_deref())?;
    logging::init(&config.logging.level)?;

    tracing::info!(
        remote_cache = config.cache.remote_url.is_some(),
        concurrency = config.research.concurrency,
        "web-research-host starting"
    );

    let pipeline = build_pipeline(&config).await?;
    let handler = ToolHandler::new(Arc::new(pipeline), app_dirs::prompts_dir());

    run_stdio_bridge(handler).await.map_err(|e| {
        tracing::error!(error = %e, "web-research-host exited with error");
        anyhow::anyhow!("web-research-host failed: {e}")
    })?;

    tracing::info!("web-research-host shut down cleanly");
    Ok(())
}
