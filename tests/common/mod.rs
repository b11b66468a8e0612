// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use otelship::config::CorrelationMode;
use otelship::correlate::{CorrelationLookup, LookupDelta};
use otelship::cursor::{StreamCursor, StreamId};
use otelship::error::StoreError;
use otelship::ingest::IngestOptions;
use otelship::pipeline::PipelineOptions;
use otelship::store::{InsertOutcome, MemoryStore, SinkKind, Store};

// ============================================================================
// LINE BUILDERS
// ============================================================================

pub fn str_attr(key: &str, value: &str) -> Value {
    json!({"key": key, "value": {"stringValue": value}})
}

pub fn int_attr(key: &str, value: i64) -> Value {
    json!({"key": key, "value": {"intValue": value.to_string()}})
}

pub fn span(trace_id: &str, span_id: &str, attributes: Vec<Value>) -> Value {
    json!({
        "traceId": trace_id,
        "spanId": span_id,
        "startTimeUnixNano": "1700000000000000000",
        "endTimeUnixNano": "1700000000500000000",
        "attributes": attributes,
    })
}

/// Tool invocation span for `call_id` in `trace_id`.
pub fn tool_span(trace_id: &str, call_id: &str, tool: &str) -> Value {
    span(
        trace_id,
        &format!("span-{}", call_id),
        vec![
            str_attr("ai.toolCall.id", call_id),
            str_attr("ai.toolCall.name", tool),
        ],
    )
}

/// Prompt-bearing span with a single user message.
pub fn prompt_span(trace_id: &str, user_message: &str, model: &str) -> Value {
    let messages = json!([{"role": "user", "content": user_message}]).to_string();
    span(
        trace_id,
        &format!("prompt-{}", trace_id),
        vec![
            str_attr("ai.prompt.messages", &messages),
            str_attr("gen_ai.request.model", model),
            str_attr("ai.response.text", "done"),
        ],
    )
}

pub fn span_line(spans: Vec<Value>) -> String {
    json!({"resourceSpans": [{"scopeSpans": [{"spans": spans}]}]}).to_string()
}

pub fn point(attributes: Vec<Value>, value: i64) -> Value {
    json!({
        "attributes": attributes,
        "timeUnixNano": "1700000001000000000",
        "asInt": value.to_string(),
    })
}

pub fn metric(name: &str, points: Vec<Value>) -> Value {
    json!({"name": name, "sum": {"dataPoints": points}})
}

pub fn metric_line(metrics: Vec<Value>) -> String {
    json!({"resourceMetrics": [{"scopeMetrics": [{"metrics": metrics}]}]}).to_string()
}

/// Permission decision for `call_id`, optionally paired with added/deleted line counts.
pub fn decision_line(call_id: &str, reply: &str, loc: Option<(i64, i64)>, extra: Vec<Value>) -> String {
    let mut attrs = vec![str_attr("call.id", call_id), str_attr("permission.reply", reply)];
    attrs.extend(extra);
    let mut metrics = vec![metric("opencode.permission.requests", vec![point(attrs, 1)])];
    if let Some((added, deleted)) = loc {
        metrics.push(metric(
            "opencode.tool.loc.added",
            vec![point(vec![str_attr("call.id", call_id)], added)],
        ));
        metrics.push(metric(
            "opencode.tool.loc.deleted",
            vec![point(vec![str_attr("call.id", call_id)], deleted)],
        ));
    }
    metric_line(metrics)
}

// ============================================================================
// FILES
// ============================================================================

pub fn write_lines(path: &Path, lines: &[String]) {
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    std::fs::write(path, content).unwrap();
}

pub fn append_raw(path: &Path, raw: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(raw.as_bytes()).unwrap();
}

pub fn append_lines(path: &Path, lines: &[String]) {
    for line in lines {
        append_raw(path, &format!("{}\n", line));
    }
}

/// Temp directory with both stream paths and a database path.
pub struct Workspace {
    pub dir: TempDir,
    pub traces: PathBuf,
    pub metrics: PathBuf,
    pub database: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            traces: dir.path().join("traces.jsonl"),
            metrics: dir.path().join("metrics.jsonl"),
            database: dir.path().join("state").join("telemetry.db"),
            dir,
        }
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            traces_file: self.traces.clone(),
            metrics_file: self.metrics.clone(),
            correlation_mode: CorrelationMode::FullScan,
            ingest: IngestOptions::default(),
        }
    }
}

// ============================================================================
// FAULT-INJECTING STORE
// ============================================================================

/// Wraps a [`MemoryStore`] and fails on demand.
pub struct FlakyStore {
    pub inner: MemoryStore,
    /// Inserts allowed before every further insert fails.
    insert_budget: AtomicUsize,
    failing_inserts: AtomicBool,
    pub unreachable: AtomicBool,
    pub cursor_reads: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            insert_budget: AtomicUsize::new(0),
            failing_inserts: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            cursor_reads: AtomicUsize::new(0),
        })
    }

    pub fn fail_inserts_after(&self, successes: usize) {
        self.insert_budget.store(successes, Ordering::SeqCst);
        self.failing_inserts.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failing_inserts.store(false, Ordering::SeqCst);
        self.unreachable.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn load_cursor(&self, stream: StreamId) -> Result<Option<StreamCursor>, StoreError> {
        self.cursor_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_cursor(stream).await
    }

    async fn save_cursor(&self, cursor: &StreamCursor) -> Result<(), StoreError> {
        self.inner.save_cursor(cursor).await
    }

    async fn reset_cursors(&self) -> Result<usize, StoreError> {
        self.inner.reset_cursors().await
    }

    async fn insert_if_absent(
        &self,
        sink: SinkKind,
        id: &str,
        document: &Value,
    ) -> Result<InsertOutcome, StoreError> {
        if self.failing_inserts.load(Ordering::SeqCst) {
            let remaining = self.insert_budget.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(StoreError::write_failed(id, "disk full"));
            }
            self.insert_budget.store(remaining - 1, Ordering::SeqCst);
        }
        self.inner.insert_if_absent(sink, id, document).await
    }

    async fn get_document(&self, sink: SinkKind, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get_document(sink, id).await
    }

    async fn count_documents(&self, sink: SinkKind) -> Result<u64, StoreError> {
        self.inner.count_documents(sink).await
    }

    async fn load_lookup(&self) -> Result<CorrelationLookup, StoreError> {
        self.inner.load_lookup().await
    }

    async fn save_lookup(&self, delta: &LookupDelta) -> Result<(), StoreError> {
        self.inner.save_lookup(delta).await
    }
}
