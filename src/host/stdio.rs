//! Newline-delimited JSON bridge for the tool host.
//!
//! Reads `CommandEnvelope` lines from the input, runs each command on its
//! own task through the [`ToolHandler`], and writes `ResponseEnvelope` and
//! `EventEnvelope` lines to the output.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::error::{Result, ServiceError};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::handler::ToolHandler;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Run the bridge on the process's stdin/stdout.
pub async fn run_stdio_bridge(handler: ToolHandler) -> Result<()> {
    run_bridge(handler, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Run the bridge until the input closes or `runtime.stop` is received.
///
/// Two tasks cooperate:
///
/// 1. **Reader** (current task) -- parses each line and spawns a command
///    task, so a slow `research` never blocks `cache.stats` or `host.ping`.
/// 2. **Writer** -- owns the output and writes lines from a single channel.
///    A command's progress events are queued before its response, so they
///    always appear first on the wire.
///
/// On EOF, in-flight commands finish and their responses are written. On
/// `runtime.stop`, in-flight commands are aborted after the stop response.
pub async fn run_bridge<R, W>(handler: ToolHandler, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let handler = Arc::new(handler);
    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer_handle = tokio::spawn(run_writer(BufWriter::new(output), out_rx));

    let mut tasks = JoinSet::new();
    let reader_result = run_reader(&handler, input, &out_tx, &mut tasks).await;

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::error!(error = %e, "command task panicked");
            }
        }
    }

    // Closing the last sender lets the writer drain and exit.
    drop(out_tx);
    let writer_result = writer_handle
        .await
        .map_err(|e| ServiceError::Channel(format!("writer task failed: {e}")))?;

    reader_result.and(writer_result)
}

async fn run_reader<R: AsyncRead + Unpin>(
    handler: &Arc<ToolHandler>,
    input: R,
    out_tx: &mpsc::UnboundedSender<String>,
    tasks: &mut JoinSet<()>,
) -> Result<()> {
    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| ServiceError::Channel(format!("failed to read from input: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match parse_envelope(trimmed) {
            Ok(envelope) => envelope,
            Err(response) => {
                send_json(out_tx, &response);
                continue;
            }
        };

        // Reap finished commands so the set only holds live ones.
        while tasks.try_join_next().is_some() {}

        if envelope.command == CommandName::RuntimeStop {
            let sink = event_sink(out_tx.clone());
            let response = handler.handle(envelope, &sink).await;
            send_json(out_tx, &response);
            tracing::info!(in_flight = tasks.len(), "runtime.stop received; shutting down bridge");
            tasks.abort_all();
            return Ok(());
        }

        let handler = Arc::clone(handler);
        let out = out_tx.clone();
        tasks.spawn(async move {
            let request_id = envelope.request_id.clone();
            let command = envelope.command;
            let sink = event_sink(out.clone());
            let response = match AssertUnwindSafe(handler.handle(envelope, &sink))
                .catch_unwind()
                .await
            {
                Ok(response) => response,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    tracing::error!(request_id = %request_id, %command, reason, "command handler panicked");
                    ResponseEnvelope::error(request_id, format!("internal error: {reason}"))
                }
            };
            send_json(&out, &response);
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("command panicked")
}

/// Parse one input line. On failure, the error response carries the
/// `request_id` when the line was at least a JSON object that had one.
fn parse_envelope(line: &str) -> std::result::Result<CommandEnvelope, ResponseEnvelope> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        tracing::warn!(error = %e, "failed to parse command line as JSON");
        ResponseEnvelope::error("parse-error", format!("failed to parse command envelope: {e}"))
    })?;
    let request_id = value
        .get("request_id")
        .and_then(|id| id.as_str())
        .filter(|id| !id.trim().is_empty())
        .unwrap_or("parse-error")
        .to_owned();
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "invalid command envelope");
        ResponseEnvelope::error(request_id, format!("failed to parse command envelope: {e}"))
    })
}

fn event_sink(out: mpsc::UnboundedSender<String>) -> impl Fn(EventEnvelope) + Send + Sync {
    move |event| send_json(&out, &event)
}

fn send_json<T: Serialize>(out: &mpsc::UnboundedSender<String>, message: &T) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if out.send(json).is_err() {
                tracing::debug!("output writer has stopped; dropping message");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize outbound message; skipping"),
    }
}

async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: BufWriter<W>,
    mut lines: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    while let Some(json) = lines.recv().await {
        write_line(&mut writer, &json).await?;
    }
    writer
        .shutdown()
        .await
        .map_err(|e| ServiceError::Channel(format!("failed to close output: {e}")))
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| ServiceError::Channel(format!("failed to write to output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| ServiceError::Channel(format!("failed to write newline to output: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ServiceError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
