//! CLI binary for web-research.

use clap::{Parser, Subcommand};
use research_core::{
    FetchOutcome, OutputFormat, ResearchPipeline, ResearchProgress, ResearchResult,
};
use std::path::PathBuf;
use std::time::Duration;
use web_research::{ServiceConfig, app_dirs, build_pipeline, format, logging, prompts};

/// Search the web, fetch result pages concurrently and print readable text.
#[derive(Parser)]
#[command(name = "web-research", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "WEB_RESEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// List filtered search results without fetching them.
    Search {
        query: String,
        /// Maximum results to print.
        #[arg(short = 'n', long, default_value_t = 20)]
        num_results: usize,
    },

    /// Fetch one page and print its extracted text.
    Fetch {
        url: String,
        /// Maximum characters of content.
        #[arg(long)]
        max_length: Option<usize>,
    },

    /// Search, fetch every result and print the aggregated content.
    Research {
        query: String,
        /// Output format: json, raw or markdown.
        #[arg(short, long, default_value = "markdown")]
        format: OutputFormat,
        /// Candidates requested from search.
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
        /// Fetches in flight at once.
        #[arg(short = 'k', long)]
        concurrency: Option<usize>,
        /// Whole-request bound in seconds.
        #[arg(long)]
        deadline: Option<u64>,
        /// Bypass the cache.
        #[arg(long)]
        no_cache: bool,
        /// Print each outcome as one JSON line as it is recorded, instead
        /// of the formatted result.
        #[arg(long)]
        stream: bool,
    },

    /// Print the active filter lists as JSON.
    Filters,

    /// Print the research report prompt.
    Prompt {
        /// Fill the `{topic}` placeholder.
        #[arg(long)]
        topic: Option<String>,
        /// Fill the `{N}` placeholder.
        #[arg(long)]
        pages: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging.level)?;

    if let Command::Prompt { topic, pages } = &cli.command {
        let template = prompts::load_report_template(&app_dirs::prompts_dir());
        println!(
            "{}",
            prompts::render_report_prompt(&template, topic.as_deref(), *pages)
        );
        return Ok(());
    }

    let pipeline = build_pipeline(&config).await?;
    match cli.command {
        Command::Search { query, num_results } => run_search(&pipeline, &query, num_results).await,
        Command::Fetch { url, max_length } => run_fetch(&pipeline, &url, max_length).await,
        Command::Research {
            query,
            format,
            max_results,
            concurrency,
            deadline,
            no_cache,
            stream,
        } => {
            let mut options = pipeline.default_options();
            options.output_format = format;
            options.use_cache = !no_cache;
            if let Some(n) = max_results {
                options.max_results = n;
            }
            if let Some(k) = concurrency {
                options.concurrency = k;
            }
            if let Some(secs) = deadline {
                options.request_deadline = Duration::from_secs(secs);
            }
            let print_line = |event: ResearchProgress| {
                if let ResearchProgress::Outcome { outcome, .. } = event {
                    match format::format_outcome_line(&outcome) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "skipping outcome"),
                    }
                }
            };
            let result = if stream {
                pipeline
                    .research_with_progress(&query, &options, &print_line)
                    .await?
            } else {
                pipeline.research(&query, &options).await?
            };
            if stream {
                // A cache hit reports no per-outcome progress.
                if result.cached {
                    for outcome in &result.outcomes {
                        println!("{}", format::format_outcome_line(outcome)?);
                    }
                }
            } else {
                print_result(&result, format, options.max_content_chars)?;
            }
            eprintln!(
                "{} searched, {} succeeded, {} filtered, {} failed in {} ms{}",
                result.stats.searched,
                result.stats.succeeded,
                result.stats.filtered,
                result.stats.failed,
                result.stats.elapsed_ms,
                if result.cached { " (cached)" } else { "" }
            );
            Ok(())
        }
        Command::Filters => {
            let lists = pipeline.filters().lists();
            println!("{}", serde_json::to_string_pretty(&lists)?);
            Ok(())
        }
        Command::Prompt { .. } => Ok(()),
    }
}

fn print_result(result: &ResearchResult, format: OutputFormat, max_preview: usize) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&format::format_json(result))?);
        }
        OutputFormat::Raw => print!("{}", format::format_raw(&result.outcomes)),
        OutputFormat::Markdown => print!("{}", format::format_markdown(result, max_preview)),
    }
    Ok(())
}

async fn run_search(pipeline: &ResearchPipeline, query: &str, limit: usize) -> anyhow::Result<()> {
    let results = pipeline.search(query, limit.max(1)).await?;
    for (i, result) in results.iter().enumerate() {
        println!("{}. {}\n   {}", i + 1, result.title, result.url);
        if !result.snippet.is_empty() {
            println!("   {}", result.snippet);
        }
    }
    Ok(())
}

async fn run_fetch(
    pipeline: &ResearchPipeline,
    url: &str,
    max_length: Option<usize>,
) -> anyhow::Result<()> {
    let mut options = pipeline.page_options();
    if let Some(max) = max_length {
        options.max_content_chars = max;
    }
    match pipeline.fetch_page(url, &options).await? {
        FetchOutcome::Success {
            extracted_text,
            word_count,
            ..
        } => {
            println!("{extracted_text}");
            eprintln!("{word_count} words");
            Ok(())
        }
        FetchOutcome::Filtered { reason, .. } => anyhow::bail!("{url} was filtered ({reason})"),
        FetchOutcome::Failed {
            error_kind, detail, ..
        } => anyhow::bail!("{url} failed: {error_kind}: {detail}"),
    }
}
