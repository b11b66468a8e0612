// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cursor store, record sinks and persisted correlation tables.
//!
//! A [`Store`] is opened once per run and reused. Every write is an
//! independent idempotent operation: cursors are replaced wholesale by stream
//! id, records are inserted only if their identity is absent.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteDatabase, SqliteStore, SCHEMA_VERSION};

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::correlate::{CorrelationLookup, LookupDelta};
use crate::cursor::{StreamCursor, StreamId};
use crate::error::StoreError;

/// The two output sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    PromptRecords,
    MetricsRecords,
}

impl SinkKind {
    pub const ALL: [SinkKind; 2] = [SinkKind::PromptRecords, SinkKind::MetricsRecords];

    /// External sink name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromptRecords => "prompt-records",
            Self::MetricsRecords => "metrics-records",
        }
    }

    /// Sink that receives records extracted from `stream`.
    pub fn for_stream(stream: StreamId) -> Self {
        match stream {
            StreamId::Traces => Self::PromptRecords,
            StreamId::Metrics => Self::MetricsRecords,
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A document with the same identity already exists; nothing was written.
    Duplicate,
}

/// Persistence used by a run.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Check the store is reachable. Called once at run start.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Load the cursor of a stream, if one was ever saved.
    async fn load_cursor(&self, stream: StreamId) -> Result<Option<StreamCursor>, StoreError>;

    /// Replace the cursor of `cursor.stream` wholesale.
    async fn save_cursor(&self, cursor: &StreamCursor) -> Result<(), StoreError>;

    /// Delete every cursor. Returns how many were removed.
    async fn reset_cursors(&self) -> Result<usize, StoreError>;

    /// Insert `document` under `id` unless a document with that id exists.
    async fn insert_if_absent(
        &self,
        sink: SinkKind,
        id: &str,
        document: &Value,
    ) -> Result<InsertOutcome, StoreError>;

    /// Fetch one document by identity.
    async fn get_document(&self, sink: SinkKind, id: &str) -> Result<Option<Value>, StoreError>;

    /// Number of documents in a sink.
    async fn count_documents(&self, sink: SinkKind) -> Result<u64, StoreError>;

    /// Load the persisted correlation tables (empty if none).
    async fn load_lookup(&self) -> Result<CorrelationLookup, StoreError>;

    /// Upsert changed correlation entries.
    async fn save_lookup(&self, delta: &LookupDelta) -> Result<(), StoreError>;
}
