//! Command handler exposing the research pipeline as host tools.

use crate::error::{Result, ServiceError};
use crate::format;
use crate::host::contract::{
    CommandEnvelope, CommandName, EventEnvelope, RESEARCH_PROGRESS_EVENT, ResponseEnvelope,
};
use crate::prompts;
use research_core::{FilterUpdate, OutputFormat, ResearchPipeline, ResearchProgress};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Receives events produced while a command runs.
pub type EventSink<'a> = &'a (dyn Fn(EventEnvelope) + Send + Sync);

/// Default and upper bound for `search_web` result counts.
const DEFAULT_SEARCH_RESULTS: usize = 50;
const MAX_SEARCH_RESULTS: usize = 200;

/// Dispatches validated commands to a shared [`ResearchPipeline`].
///
/// Cheap to share across tasks: every command borrows the handler
/// immutably, so commands run concurrently.
pub struct ToolHandler {
    pipeline: Arc<ResearchPipeline>,
    prompts_dir: PathBuf,
}

impl ToolHandler {
    /// Create a handler. Report template overrides are read from `prompts_dir`.
    pub fn new(pipeline: Arc<ResearchPipeline>, prompts_dir: PathBuf) -> Self {
        Self {
            pipeline,
            prompts_dir,
        }
    }

    /// Handle one command. Failures become error responses; progress events
    /// for `research` are passed to `events`.
    pub async fn handle(
        &self,
        envelope: CommandEnvelope,
        events: EventSink<'_>,
    ) -> ResponseEnvelope {
        if let Err(e) = envelope.validate() {
            return ResponseEnvelope::error(envelope.request_id, e.to_string());
        }
        debug!(request_id = %envelope.request_id, command = %envelope.command, "dispatching command");
        match self.dispatch(&envelope, events).await {
            Ok(payload) => ResponseEnvelope::ok(envelope.request_id, payload),
            Err(e) => {
                warn!(
                    request_id = %envelope.request_id,
                    command = %envelope.command,
                    error = %e,
                    "command failed"
                );
                ResponseEnvelope::error(envelope.request_id, e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        envelope: &CommandEnvelope,
        events: EventSink<'_>,
    ) -> Result<Value> {
        match envelope.command {
            CommandName::HostPing => Ok(json!({
                "pong": true,
                "version": env!("CARGO_PKG_VERSION"),
                "time": chrono::Utc::now().to_rfc3339(),
            })),
            CommandName::ToolsList => Ok(tool_descriptors()),
            CommandName::SearchWeb => self.search_web(parse_payload(&envelope.payload)?).await,
            CommandName::FetchPage => self.fetch_page(parse_payload(&envelope.payload)?).await,
            CommandName::Research => {
                self.research(
                    &envelope.request_id,
                    parse_payload(&envelope.payload)?,
                    events,
                )
                .await
            }
            CommandName::FiltersGet => {
                let snapshot = self.pipeline.filters();
                Ok(json!({
                    "version": snapshot.version(),
                    "content_hash": snapshot.content_hash(),
                    "lists": snapshot.lists(),
                }))
            }
            CommandName::FiltersUpdate => {
                let update: FilterUpdate = parse_payload(&envelope.payload)?;
                let snapshot = self.pipeline.update_filters(update)?;
                Ok(json!({
                    "status": "ok",
                    "version": snapshot.version(),
                    "content_hash": snapshot.content_hash(),
                }))
            }
            CommandName::CacheClear => {
                self.pipeline.clear_cache().await;
                Ok(json!({"status": "ok"}))
            }
            CommandName::CacheStats => to_payload(&self.pipeline.cache_stats()),
            CommandName::PromptResearchReport => {
                let args: PromptArgs = parse_payload(&envelope.payload)?;
                let template = prompts::load_report_template(&self.prompts_dir);
                Ok(json!({
                    "name": "research_report",
                    "description": "Research report synthesis template",
                    "prompt": prompts::render_report_prompt(&template, args.topic.as_deref(), args.pages),
                }))
            }
            CommandName::RuntimeStop => Ok(json!({"status": "stopping"})),
        }
    }

    async fn search_web(&self, args: SearchWebArgs) -> Result<Value> {
        let query = required("query", &args.query)?;
        let limit = args
            .num_results
            .unwrap_or(DEFAULT_SEARCH_RESULTS)
            .clamp(1, MAX_SEARCH_RESULTS);
        let results = self.pipeline.search(query, limit).await?;
        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results,
        }))
    }

    async fn fetch_page(&self, args: FetchPageArgs) -> Result<Value> {
        let url = required("url", &args.url)?;
        let mut options = self.pipeline.page_options();
        if let Some(max) = args.max_length {
            options.max_content_chars = max;
        }
        if let Some(secs) = args.timeout {
            options.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(use_cache) = args.use_cache {
            options.use_cache = use_cache;
        }
        let outcome = self.pipeline.fetch_page(url, &options).await?;
        to_payload(&outcome)
    }

    async fn research(
        &self,
        request_id: &str,
        args: ResearchArgs,
        events: EventSink<'_>,
    ) -> Result<Value> {
        let query = required("query", &args.query)?;
        let mut options = self.pipeline.default_options();
        if let Some(n) = args.search_results {
            options.max_results = n;
        }
        if let Some(k) = args.max_concurrent {
            options.concurrency = k;
        }
        if let Some(secs) = args.timeout {
            options.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = args.max_retries {
            options.max_retries = retries;
        }
        if let Some(secs) = args.deadline {
            options.request_deadline = Duration::from_secs(secs);
        }
        if let Some(max) = args.max_content_length {
            options.max_content_chars = max;
        }
        if let Some(min) = args.min_content_length {
            options.min_content_chars = min;
        }
        if let Some(use_cache) = args.use_cache {
            options.use_cache = use_cache;
        }
        if let Some(format) = args.output_format {
            options.output_format = format;
        }

        let progress = |event: ResearchProgress| {
            let payload = match serde_json::to_value(&event) {
                Ok(progress) => json!({"request_id": request_id, "progress": progress}),
                Err(e) => {
                    warn!(error = %e, "failed to serialize progress event; skipping");
                    return;
                }
            };
            events(EventEnvelope::new(RESEARCH_PROGRESS_EVENT, payload));
        };
        let result = self
            .pipeline
            .research_with_progress(query, &options, &progress)
            .await?;
        Ok(format::render(
            &result,
            options.output_format,
            options.max_content_chars,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchWebArgs {
    query: String,
    num_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FetchPageArgs {
    url: String,
    max_length: Option<usize>,
    timeout: Option<u64>,
    use_cache: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResearchArgs {
    query: String,
    search_results: Option<usize>,
    max_content_length: Option<usize>,
    min_content_length: Option<usize>,
    timeout: Option<u64>,
    max_retries: Option<u32>,
    deadline: Option<u64>,
    max_concurrent: Option<usize>,
    output_format: Option<OutputFormat>,
    use_cache: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PromptArgs {
    topic: Option<String>,
    pages: Option<usize>,
}

fn parse_payload<T: DeserializeOwned + Default>(payload: &Value) -> Result<T> {
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload.clone())
        .map_err(|e| ServiceError::Protocol(format!("invalid payload: {e}")))
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ServiceError::Protocol(format!("failed to serialize payload: {e}")))
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Protocol(format!("{field} is required")));
    }
    Ok(value)
}

/// Names, descriptions and input schemas of every command.
#[must_use]
pub fn tool_descriptors() -> Value {
    let tools: Vec<Value> = CommandName::ALL
        .into_iter()
        .map(|command| {
            json!({
                "name": command.as_str(),
                "description": describe(command),
                "input_schema": input_schema(command),
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn describe(command: CommandName) -> &'static str {
    match command {
        CommandName::HostPing => "Liveness check; returns the host version.",
        CommandName::ToolsList => "List the commands this host accepts.",
        CommandName::SearchWeb => {
            "Search DuckDuckGo and return a filtered list of URLs and titles. \
             Blocked domains and low-value URL patterns are removed."
        }
        CommandName::FetchPage => {
            "Fetch a single URL and extract its readable text content, with \
             bot-challenge detection and a response size cap."
        }
        CommandName::Research => {
            "Search, then fetch every surviving result concurrently and return cleaned \
             text in search order with statistics. Results are cached."
        }
        CommandName::FiltersGet => "Return the active filter lists and their version.",
        CommandName::FiltersUpdate => {
            "Replace or extend filter lists. Applies atomically to requests that start afterwards."
        }
        CommandName::CacheClear => "Drop every cached result.",
        CommandName::CacheStats => "Return cache counters and occupancy.",
        CommandName::PromptResearchReport => {
            "Template for synthesising research output into a cited markdown report."
        }
        CommandName::RuntimeStop => "Stop the host after replying.",
    }
}

fn input_schema(command: CommandName) -> Value {
    let string_list = json!({"type": "array", "items": {"type": "string"}});
    match command {
        CommandName::SearchWeb => json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "num_results": {"type": "integer", "default": DEFAULT_SEARCH_RESULTS, "maximum": MAX_SEARCH_RESULTS},
            },
            "required": ["query"],
        }),
        CommandName::FetchPage => json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The URL to fetch"},
                "max_length": {"type": "integer", "description": "Max characters of content to return"},
                "timeout": {"type": "integer", "description": "Request timeout in seconds"},
                "use_cache": {"type": "boolean", "default": true},
            },
            "required": ["url"],
        }),
        CommandName::Research => json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Research query"},
                "search_results": {"type": "integer", "description": "Candidates requested from search"},
                "max_concurrent": {"type": "integer", "description": "Fetches in flight at once"},
                "max_content_length": {"type": "integer", "description": "Characters kept per page"},
                "min_content_length": {"type": "integer", "description": "Pages with less text fail"},
                "timeout": {"type": "integer", "description": "Per-fetch timeout in seconds"},
                "max_retries": {"type": "integer"},
                "deadline": {"type": "integer", "description": "Whole-request bound in seconds"},
                "output_format": {"type": "string", "enum": ["json", "raw", "markdown"], "default": "json"},
                "use_cache": {"type": "boolean", "default": true},
            },
            "required": ["query"],
        }),
        CommandName::FiltersUpdate => json!({
            "type": "object",
            "properties": {
                "blocked_domains": string_list,
                "skip_url_patterns": string_list,
                "blocked_content_markers": string_list,
                "navigation_patterns": string_list,
                "mode": {"type": "string", "enum": ["replace", "merge"], "default": "replace"},
            },
        }),
        CommandName::PromptResearchReport => json!({
            "type": "object",
            "properties": {
                "topic": {"type": "string"},
                "pages": {"type": "integer"},
            },
        }),
        _ => json!({"type": "object", "properties": {}}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_payload_parses_to_defaults() {
        let args: SearchWebArgs = parse_payload(&Value::Null).unwrap();
        assert!(args.query.is_empty());
        assert!(args.num_results.is_none());
    }

    #[test]
    fn mistyped_payload_is_protocol_error() {
        let err = parse_payload::<SearchWebArgs>(&json!({"query": 5})).unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));
    }

    #[test]
    fn research_args_accept_output_format() {
        let args: ResearchArgs =
            parse_payload(&json!({"query": "q", "output_format": "markdown"})).unwrap();
        assert_eq!(args.output_format, Some(OutputFormat::Markdown));
    }

    #[test]
    fn required_rejects_blank() {
        assert!(required("query", "  ").is_err());
        assert_eq!(required("query", " rust ").unwrap(), "rust");
    }

    #[test]
    fn descriptors_cover_every_command() {
        let value = tool_descriptors();
        let tools = value["tools"].as_array().unwrap();
        assert_eq!(tools.len(), CommandName::ALL.len());
        let research = tools.iter().find(|t| t["name"] == "research").unwrap();
        assert_eq!(research["input_schema"]["required"][0], "query");
    }
}
