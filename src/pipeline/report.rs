// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reports returned by pipeline operations.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::CorrelationMode;
use crate::cursor::{FileFingerprint, RotationReason, StreamCursor, StreamId};
use crate::ingest::IngestSummary;
use crate::telemetry::RunId;

/// Outcome of one two-phase run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub dry_run: bool,
    pub correlation_mode: CorrelationMode,
    pub traces: IngestSummary,
    pub metrics: IngestSummary,
    /// Entries in the call table after phase 1.
    pub calls: usize,
    /// Entries in the prompt table after phase 1.
    pub prompts: usize,
    pub prompt_documents: u64,
    pub metrics_documents: u64,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new_records(&self) -> u64 {
        self.traces.new_records + self.metrics.new_records
    }

    pub fn duplicates(&self) -> u64 {
        self.traces.duplicates + self.metrics.duplicates
    }
}

/// Cursor position of one stream against its current file.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub stream: StreamId,
    pub path: PathBuf,
    pub cursor: Option<StreamCursor>,
    #[serde(skip)]
    pub fingerprint: Option<FileFingerprint>,
    /// Bytes the next run would read past the cursor.
    pub unprocessed_bytes: u64,
    #[serde(skip)]
    pub rotation: Option<RotationReason>,
}

impl StreamStatus {
    pub fn file_exists(&self) -> bool {
        self.fingerprint.is_some()
    }

    pub fn rotated(&self) -> bool {
        self.rotation.is_some()
    }
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub store: String,
    pub streams: Vec<StreamStatus>,
    pub prompt_documents: u64,
    pub metrics_documents: u64,
}

impl StatusReport {
    pub fn stream(&self, stream: StreamId) -> Option<&StreamStatus> {
        self.streams.iter().find(|s| s.stream == stream)
    }
}
