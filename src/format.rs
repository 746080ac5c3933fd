//! Output formatters for research results: structured JSON, raw text,
//! markdown and NDJSON lines.
//!
//! Only successful outcomes contribute content. Filtered and failed outcomes
//! remain visible through the stats (and in full via NDJSON).

use crate::error::{Result, ServiceError};
use research_core::{FetchOutcome, OutputFormat, ResearchResult};
use serde_json::{Value, json};
use std::fmt::Write as _;

/// Structured response: query, cache flag, stats and one entry per success.
#[must_use]
pub fn format_json(result: &ResearchResult) -> Value {
    let content: Vec<Value> = result
        .successes()
        .filter_map(|outcome| match outcome {
            FetchOutcome::Success {
                url,
                final_url,
                title,
                extracted_text,
                word_count,
                ..
            } => Some(json!({
                "url": url,
                "final_url": final_url,
                "title": title,
                "content": extracted_text,
                "word_count": word_count,
            })),
            _ => None,
        })
        .collect();
    json!({
        "query": result.query,
        "cached": result.cached,
        "stats": result.stats,
        "content": content,
    })
}

/// Plain text: a `=== url ===` header followed by the page text.
#[must_use]
pub fn format_raw(outcomes: &[FetchOutcome]) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        if let Some(block) = format_outcome_raw(outcome) {
            out.push_str(&block);
            out.push('\n');
        }
    }
    out
}

/// A single successful outcome as raw text, `None` for anything else.
#[must_use]
pub fn format_outcome_raw(outcome: &FetchOutcome) -> Option<String> {
    match outcome {
        FetchOutcome::Success {
            url,
            extracted_text,
            ..
        } => Some(format!("=== {url} ===\n{extracted_text}\n")),
        _ => None,
    }
}

/// Markdown digest. Each page body is cut to `max_preview` characters.
#[must_use]
pub fn format_markdown(result: &ResearchResult, max_preview: usize) -> String {
    let mut out = String::new();
    let _ = write!(out, "# Research: {}\n\n", result.query);
    let _ = write!(
        out,
        "**Sources Analyzed**: {} pages\n\n---\n\n",
        result.stats.succeeded
    );
    for outcome in result.successes() {
        let FetchOutcome::Success {
            url,
            title,
            extracted_text,
            ..
        } = outcome
        else {
            continue;
        };
        if extracted_text.is_empty() {
            continue;
        }
        let heading = if title.is_empty() { url } else { title };
        let _ = write!(out, "## {heading}\n*Source: {url}*\n\n");
        out.push_str(&preview(extracted_text, max_preview));
        out.push_str("\n\n---\n\n");
    }
    out
}

/// One outcome as a single JSON line, for streaming consumers.
pub fn format_outcome_line(outcome: &FetchOutcome) -> Result<String> {
    serde_json::to_string(outcome)
        .map_err(|e| ServiceError::Protocol(format!("failed to serialize outcome: {e}")))
}

/// Render `result` in the requested format.
///
/// Raw and markdown text is wrapped in the same envelope as JSON so callers
/// always see the query, cache flag and stats.
#[must_use]
pub fn render(result: &ResearchResult, format: OutputFormat, max_preview: usize) -> Value {
    let text = match format {
        OutputFormat::Json => return format_json(result),
        OutputFormat::Raw => format_raw(&result.outcomes),
        OutputFormat::Markdown => format_markdown(result, max_preview),
    };
    json!({
        "query": result.query,
        "cached": result.cached,
        "stats": result.stats,
        "content": text,
    })
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
