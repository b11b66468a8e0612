// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resume safety of the tail: rotation, truncation, rewind, partial writes.

mod common;

use common::*;
use otelship::correlate::CorrelationLookup;
use otelship::cursor::{FileFingerprint, RotationReason, StreamCursor, StreamId};
use otelship::extract::PromptExtractor;
use otelship::ingest::{IncrementalIngestor, IngestOptions, IngestSummary};
use otelship::store::{MemoryStore, SinkKind, Store};

const IMPORTED_AT: &str = "2024-01-01T00:00:00+00:00";

fn tool_lines(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| span_line(vec![tool_span(&format!("{}-t{}", prefix, i), &format!("{}-c{}", prefix, i), "edit")]))
        .collect()
}

async fn ingest(store: &dyn Store, path: &std::path::Path, options: IngestOptions) -> IngestSummary {
    let lookup = CorrelationLookup::new();
    let extractor = PromptExtractor::new(&lookup, IMPORTED_AT);
    IncrementalIngestor::new(store, options)
        .ingest(StreamId::Traces, path, &extractor)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_unchanged_file_yields_nothing_new() {
    let ws = Workspace::new();
    write_lines(&ws.traces, &tool_lines("a", 20));
    let store = MemoryStore::new();

    let first = ingest(&store, &ws.traces, IngestOptions::default()).await;
    let second = ingest(&store, &ws.traces, IngestOptions::default()).await;

    assert_eq!(first.new_records, 20);
    assert_eq!(second.new_records, 0);
    assert_eq!(store.count_documents(SinkKind::PromptRecords).await.unwrap(), 20);
}

#[cfg(unix)]
#[tokio::test]
async fn test_replaced_file_resyncs_from_zero() {
    let ws = Workspace::new();
    write_lines(&ws.traces, &tool_lines("old", 3));
    let store = MemoryStore::new();
    ingest(&store, &ws.traces, IngestOptions::default()).await;

    // Rotate: move the file away and start a fresh one at the same path.
    std::fs::rename(&ws.traces, ws.dir.path().join("traces.jsonl.1")).unwrap();
    write_lines(&ws.traces, &tool_lines("new", 2));

    let summary = ingest(&store, &ws.traces, IngestOptions::default()).await;
    assert!(matches!(
        summary.rotation,
        Some(RotationReason::GenerationChanged { .. })
    ));
    assert_eq!(summary.start_offset, 0);
    assert_eq!(summary.start_line, 0);
    assert_eq!(summary.new_records, 2);
    assert_eq!(summary.end_line, 2);

    let cursor = store.load_cursor(StreamId::Traces).await.unwrap().unwrap();
    let fingerprint = FileFingerprint::of(&ws.traces).await.unwrap().unwrap();
    assert_eq!(cursor.file_generation, Some(fingerprint.generation));
    assert_eq!(cursor.records_inserted, 5);
}

#[tokio::test]
async fn test_saved_offset_past_end_resyncs_from_zero() {
    let ws = Workspace::new();
    let lines = tool_lines("short", 4);
    write_lines(&ws.traces, &lines);
    let fingerprint = FileFingerprint::of(&ws.traces).await.unwrap().unwrap();
    assert!(fingerprint.size < 10_000);

    let store = MemoryStore::new();
    let mut cursor = StreamCursor::new(StreamId::Traces);
    cursor.advance(&ws.traces.display().to_string(), &fingerprint, 10_000, 250);
    store.save_cursor(&cursor).await.unwrap();

    let summary = ingest(&store, &ws.traces, IngestOptions::default()).await;
    assert_eq!(
        summary.rotation,
        Some(RotationReason::Truncated {
            saved_offset: 10_000,
            current_size: fingerprint.size,
        })
    );
    assert_eq!(summary.start_offset, 0);
    assert_eq!(summary.new_records, 4);
    assert_eq!(summary.end_line, 4);
}

#[tokio::test]
async fn test_truncated_in_place_picks_up_new_content() {
    let ws = Workspace::new();
    write_lines(&ws.traces, &tool_lines("before", 5));
    let store = MemoryStore::new();
    ingest(&store, &ws.traces, IngestOptions::default()).await;

    // Same file, truncated and rewritten by the exporter.
    write_lines(&ws.traces, &tool_lines("after", 1));
    let summary = ingest(&store, &ws.traces, IngestOptions::default()).await;

    assert!(summary.rotated());
    assert_eq!(summary.new_records, 1);
    assert_eq!(store.count_documents(SinkKind::PromptRecords).await.unwrap(), 6);
}

#[tokio::test]
async fn test_resume_after_crash_between_checkpoints() {
    let ws = Workspace::new();
    let lines = tool_lines("crash", 4);
    write_lines(&ws.traces, &lines[..2]);
    let store = MemoryStore::new();
    ingest(&store, &ws.traces, IngestOptions::default()).await;
    let checkpoint = store.load_cursor(StreamId::Traces).await.unwrap().unwrap();

    // A later run inserted line 3 and crashed before moving the cursor.
    append_lines(&ws.traces, &lines[2..3]);
    ingest(&store, &ws.traces, IngestOptions::default()).await;
    store.save_cursor(&checkpoint).await.unwrap();

    append_lines(&ws.traces, &lines[3..]);
    for rewind_bytes in [1, 7, lines[1].len() as u64 + 1, 4096] {
        store.save_cursor(&checkpoint).await.unwrap();
        let options = IngestOptions {
            rewind_bytes,
            ..IngestOptions::default()
        };
        let summary = ingest(&store, &ws.traces, options).await;

        assert_eq!(summary.start_line, 2, "rewind {}", rewind_bytes);
        assert_eq!(summary.end_line, 4, "rewind {}", rewind_bytes);
        assert_eq!(summary.lines_processed, 2, "rewind {}", rewind_bytes);
        assert_eq!(store.count_documents(SinkKind::PromptRecords).await.unwrap(), 4);
    }
}

#[tokio::test]
async fn test_partial_line_waits_for_completion() {
    let ws = Workspace::new();
    let lines = tool_lines("tail", 2);
    write_lines(&ws.traces, &lines[..1]);
    append_raw(&ws.traces, &lines[1][..lines[1].len() / 2]);
    let store = MemoryStore::new();

    let summary = ingest(&store, &ws.traces, IngestOptions::default()).await;
    assert!(summary.unterminated_tail);
    assert_eq!(summary.new_records, 1);
    assert_eq!(summary.end_offset, lines[0].len() as u64 + 1);

    append_raw(&ws.traces, &format!("{}\n", &lines[1][lines[1].len() / 2..]));
    let summary = ingest(&store, &ws.traces, IngestOptions::default()).await;
    assert!(!summary.unterminated_tail);
    assert_eq!(summary.new_records, 1);
    assert_eq!(summary.end_line, 2);
    assert_eq!(store.count_documents(SinkKind::PromptRecords).await.unwrap(), 2);
}

#[tokio::test]
async fn test_malformed_lines_do_not_stop_the_stream() {
    let ws = Workspace::new();
    let mut lines = tool_lines("ok", 2);
    lines.insert(1, "not json at all".to_string());
    lines.insert(2, "[1, 2, 3]".to_string());
    write_lines(&ws.traces, &lines);
    let store = MemoryStore::new();

    let summary = ingest(&store, &ws.traces, IngestOptions::default()).await;
    assert_eq!(summary.malformed_lines, 2);
    assert_eq!(summary.new_records, 2);
    assert_eq!(summary.lines_processed, 4);

    let cursor = store.load_cursor(StreamId::Traces).await.unwrap().unwrap();
    assert_eq!(cursor.line_number, 4);
}
