// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Two-phase runs through the public API with the SQLite store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use otelship::config::CorrelationMode;
use otelship::cursor::StreamId;
use otelship::pipeline::{CorrelationPipeline, PipelineOptions};
use otelship::store::{MemoryStore, SinkKind, SqliteStore, Store};

const TIMEOUT: Duration = Duration::from_secs(5);

fn sqlite_pipeline(ws: &Workspace, options: PipelineOptions) -> (Arc<SqliteStore>, CorrelationPipeline) {
    let store = Arc::new(SqliteStore::open(&ws.database, TIMEOUT).unwrap());
    let pipeline = CorrelationPipeline::new(store.clone(), options);
    (store, pipeline)
}

#[tokio::test]
async fn test_prompt_and_metrics_records_are_correlated() {
    let ws = Workspace::new();
    write_lines(
        &ws.traces,
        &[
            span_line(vec![tool_span("t1", "c1", "edit")]),
            span_line(vec![prompt_span("t1", "fix bug", "model-a")]),
        ],
    );
    write_lines(&ws.metrics, &[decision_line("c1", "once", Some((5, 1)), vec![])]);

    let store = Arc::new(MemoryStore::new());
    let pipeline = CorrelationPipeline::new(store.clone(), ws.options());
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.traces.new_records, 1);
    assert_eq!(report.metrics.new_records, 1);

    let prompt_ids = store.document_ids(SinkKind::PromptRecords).await;
    assert_eq!(prompt_ids.len(), 1);
    assert!(prompt_ids[0].ends_with(":c1"));
    let prompt = store
        .get_document(SinkKind::PromptRecords, &prompt_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prompt["user_prompt"], "fix bug");
    assert_eq!(prompt["model"], "model-a");
    assert_eq!(prompt["tool_name"], "edit");
    assert_eq!(prompt["trace_id"], "t1");
    assert_eq!(prompt["ai_response"], "done");

    let metric_ids = store.document_ids(SinkKind::MetricsRecords).await;
    assert_eq!(metric_ids.len(), 1);
    let record = store
        .get_document(SinkKind::MetricsRecords, &metric_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["accept"], true);
    assert_eq!(record["ai_loc"], 5);
    assert_eq!(record["deleted_loc"], 1);
    assert_eq!(record["model"], "model-a");
    assert_eq!(record["call_id"], "c1");
    assert_eq!(record["reply_type"], "once");
    assert_eq!(record["function_category"], "opencode");
}

#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let ws = Workspace::new();
    write_lines(&ws.traces, &[span_line(vec![tool_span("t1", "c1", "edit")])]);
    write_lines(&ws.metrics, &[decision_line("c1", "always", None, vec![])]);

    {
        let (_, pipeline) = sqlite_pipeline(&ws, ws.options());
        let first = pipeline.run().await.unwrap();
        assert_eq!(first.new_records(), 2);
    }

    // A new process opens the same database.
    append_lines(&ws.traces, &[span_line(vec![tool_span("t2", "c2", "bash")])]);
    let (store, pipeline) = sqlite_pipeline(&ws, ws.options());
    let second = pipeline.run().await.unwrap();

    assert_eq!(second.traces.new_records, 1);
    assert_eq!(second.traces.start_line, 1);
    assert_eq!(second.traces.end_line, 2);
    assert_eq!(second.metrics.new_records, 0);
    assert_eq!(second.prompt_documents, 2);
    assert_eq!(second.metrics_documents, 1);

    let cursor = store.load_cursor(StreamId::Traces).await.unwrap().unwrap();
    assert_eq!(cursor.line_number, 2);
    assert_eq!(cursor.last_total_lines, Some(2));
    assert_eq!(cursor.records_inserted, 2);
    assert_eq!(cursor.byte_offset, std::fs::metadata(&ws.traces).unwrap().len());
}

#[tokio::test]
async fn test_rejected_decision_has_no_ai_lines() {
    let ws = Workspace::new();
    write_lines(&ws.traces, &[]);
    write_lines(
        &ws.metrics,
        &[
            decision_line("c1", "reject", Some((7, 2)), vec![]),
            decision_line("c2", "auto", Some((3, 0)), vec![]),
        ],
    );

    let store = Arc::new(MemoryStore::new());
    CorrelationPipeline::new(store.clone(), ws.options())
        .run()
        .await
        .unwrap();

    let mut by_call = std::collections::HashMap::new();
    for id in store.document_ids(SinkKind::MetricsRecords).await {
        let doc = store
            .get_document(SinkKind::MetricsRecords, &id)
            .await
            .unwrap()
            .unwrap();
        by_call.insert(doc["call_id"].as_str().unwrap().to_string(), doc);
    }

    assert_eq!(by_call["c1"]["accept"], false);
    assert_eq!(by_call["c1"]["ai_loc"], 0);
    assert_eq!(by_call["c1"]["deleted_loc"], 0);
    assert_eq!(by_call["c2"]["accept"], true);
    assert_eq!(by_call["c2"]["ai_loc"], 3);
}

#[tokio::test]
async fn test_language_falls_back_to_extension() {
    let ws = Workspace::new();
    write_lines(&ws.traces, &[]);
    write_lines(
        &ws.metrics,
        &[
            decision_line("c1", "once", None, vec![str_attr("file.path", "src/main.rs")]),
            decision_line("c2", "once", None, vec![str_attr("file.path", "notes/readme.xyz")]),
            decision_line("c3", "once", None, vec![str_attr("language", "go"), str_attr("file.path", "a.rs")]),
        ],
    );

    let store = Arc::new(MemoryStore::new());
    CorrelationPipeline::new(store.clone(), ws.options())
        .run()
        .await
        .unwrap();

    let mut languages = std::collections::HashMap::new();
    for id in store.document_ids(SinkKind::MetricsRecords).await {
        let doc = store
            .get_document(SinkKind::MetricsRecords, &id)
            .await
            .unwrap()
            .unwrap();
        languages.insert(
            doc["call_id"].as_str().unwrap().to_string(),
            doc["language"].as_str().unwrap().to_string(),
        );
    }

    assert_eq!(languages["c1"], "rust");
    assert_eq!(languages["c2"], "unknown");
    assert_eq!(languages["c3"], "go");
}

#[tokio::test]
async fn test_incremental_mode_correlates_across_runs() {
    let ws = Workspace::new();
    write_lines(
        &ws.traces,
        &[
            span_line(vec![prompt_span("t1", "add tests", "model-b")]),
            span_line(vec![tool_span("t1", "c1", "write")]),
        ],
    );
    write_lines(&ws.metrics, &[]);

    let mut options = ws.options();
    options.correlation_mode = CorrelationMode::Incremental;
    options.ingest.rewind_bytes = 1;

    let (_, pipeline) = sqlite_pipeline(&ws, options.clone());
    pipeline.run().await.unwrap();

    // The decision arrives after the spans were tailed; only the persisted
    // lookup still knows which model produced c1.
    append_lines(&ws.metrics, &[decision_line("c1", "once", Some((4, 0)), vec![])]);
    let (store, pipeline) = sqlite_pipeline(&ws, options);
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.metrics.new_records, 1);
    assert_eq!(report.calls, 1);
    assert_eq!(report.prompts, 1);

    let lookup = store.load_lookup().await.unwrap();
    let enrichment = lookup.enrichment_for("c1").unwrap();
    assert_eq!(enrichment.model, "model-b");
    assert_eq!(report.metrics_documents, 1);
}

#[tokio::test]
async fn test_switch_to_incremental_sees_earlier_spans() {
    let ws = Workspace::new();
    let mut spans = vec![
        span_line(vec![prompt_span("t1", "fix bug", "model-a")]),
        span_line(vec![tool_span("t1", "c1", "edit")]),
    ];
    for i in 0..40 {
        spans.push(span_line(vec![tool_span(&format!("t{}", i + 2), &format!("c{}", i + 2), "read")]));
    }
    write_lines(&ws.traces, &spans);
    write_lines(&ws.metrics, &[]);
    let traces_size = std::fs::metadata(&ws.traces).unwrap().len();
    assert!(traces_size > 4096);

    let store = Arc::new(MemoryStore::new());
    CorrelationPipeline::new(store.clone(), ws.options())
        .run()
        .await
        .unwrap();
    assert!(store.load_lookup().await.unwrap().is_empty());

    append_lines(&ws.metrics, &[decision_line("c1", "once", None, vec![])]);
    let mut options = ws.options();
    options.correlation_mode = CorrelationMode::Incremental;
    let report = CorrelationPipeline::new(store.clone(), options)
        .run()
        .await
        .unwrap();

    assert_eq!(report.calls, 41);
    assert_eq!(report.prompts, 1);
    let ids = store.document_ids(SinkKind::MetricsRecords).await;
    assert_eq!(ids.len(), 1);
    let record = store
        .get_document(SinkKind::MetricsRecords, &ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["model"], "model-a");

    let lookup = store.load_lookup().await.unwrap();
    assert_eq!(lookup.call_count(), 41);
    assert_eq!(lookup.position().unwrap().offset, traces_size);
}

#[tokio::test]
async fn test_dry_run_reports_without_writing() {
    let ws = Workspace::new();
    write_lines(&ws.traces, &[span_line(vec![tool_span("t1", "c1", "edit")])]);
    write_lines(&ws.metrics, &[decision_line("c1", "once", None, vec![])]);

    let mut options = ws.options();
    options.ingest.dry_run = true;
    let (store, pipeline) = sqlite_pipeline(&ws, options);

    let first = pipeline.run().await.unwrap();
    let second = pipeline.run().await.unwrap();

    assert_eq!(first.new_records(), 2);
    assert_eq!(second.new_records(), 2);
    assert_eq!(store.count_documents(SinkKind::PromptRecords).await.unwrap(), 0);
    assert_eq!(store.count_documents(SinkKind::MetricsRecords).await.unwrap(), 0);
    for stream in StreamId::ALL {
        assert!(store.load_cursor(stream).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_reset_replays_without_duplicates() {
    let ws = Workspace::new();
    write_lines(
        &ws.traces,
        &[
            span_line(vec![tool_span("t1", "c1", "edit")]),
            span_line(vec![tool_span("t2", "c2", "edit")]),
        ],
    );
    write_lines(&ws.metrics, &[decision_line("c1", "once", None, vec![])]);

    let (store, pipeline) = sqlite_pipeline(&ws, ws.options());
    pipeline.run().await.unwrap();

    assert_eq!(pipeline.reset().await.unwrap(), 2);
    let replay = pipeline.run().await.unwrap();

    assert_eq!(replay.traces.start_line, 0);
    assert_eq!(replay.traces.lines_processed, 2);
    assert_eq!(replay.new_records(), 0);
    assert_eq!(replay.duplicates(), 3);
    assert_eq!(store.count_documents(SinkKind::PromptRecords).await.unwrap(), 2);
}

#[tokio::test]
async fn test_status_reports_unprocessed_bytes() {
    let ws = Workspace::new();
    let first = span_line(vec![tool_span("t1", "c1", "edit")]);
    write_lines(&ws.traces, &[first]);
    write_lines(&ws.metrics, &[]);

    let (_, pipeline) = sqlite_pipeline(&ws, ws.options());
    pipeline.run().await.unwrap();

    let extra = span_line(vec![tool_span("t2", "c2", "edit")]);
    append_lines(&ws.traces, &[extra.clone()]);

    let status = pipeline.status().await.unwrap();
    let traces = status.stream(StreamId::Traces).unwrap();
    assert_eq!(traces.unprocessed_bytes, extra.len() as u64 + 1);
    assert!(!traces.rotated());
    assert_eq!(status.prompt_documents, 1);
    assert_eq!(status.store, "sqlite");
}
