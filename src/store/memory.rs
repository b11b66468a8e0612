// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory store for dry runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::correlate::{CallInfo, CorrelationLookup, LookupDelta, PromptData, ScanPosition};
use crate::cursor::{StreamCursor, StreamId};
use crate::error::StoreError;

use super::{InsertOutcome, SinkKind, Store};

#[derive(Default)]
struct MemoryState {
    cursors: HashMap<StreamId, StreamCursor>,
    documents: HashMap<SinkKind, HashMap<String, Value>>,
    calls: HashMap<String, CallInfo>,
    prompts: HashMap<String, PromptData>,
    position: Option<ScanPosition>,
}

/// A [`Store`] that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities stored in a sink, sorted.
    pub async fn document_ids(&self, sink: SinkKind) -> Vec<String> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state
            .documents
            .get(&sink)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_cursor(&self, stream: StreamId) -> Result<Option<StreamCursor>, StoreError> {
        Ok(self.state.lock().await.cursors.get(&stream).cloned())
    }

    async fn save_cursor(&self, cursor: &StreamCursor) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .cursors
            .insert(cursor.stream, cursor.clone());
        Ok(())
    }

    async fn reset_cursors(&self) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let removed = state.cursors.len();
        state.cursors.clear();
        Ok(removed)
    }

    async fn insert_if_absent(
        &self,
        sink: SinkKind,
        id: &str,
        document: &Value,
    ) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let docs = state.documents.entry(sink).or_default();
        if docs.contains_key(id) {
            return Ok(InsertOutcome::Duplicate);
        }
        docs.insert(id.to_string(), document.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_document(&self, sink: SinkKind, id: &str) -> Result<Option<Value>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.documents.get(&sink).and_then(|docs| docs.get(id)).cloned())
    }

    async fn count_documents(&self, sink: SinkKind) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.documents.get(&sink).map_or(0, |docs| docs.len() as u64))
    }

    async fn load_lookup(&self) -> Result<CorrelationLookup, StoreError> {
        let state = self.state.lock().await;
        Ok(
            CorrelationLookup::from_parts(state.calls.clone(), state.prompts.clone())
                .with_position(state.position),
        )
    }

    async fn save_lookup(&self, delta: &LookupDelta) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for (call_id, info) in &delta.calls {
            state.calls.insert(call_id.clone(), info.clone());
        }
        for (trace_id, data) in &delta.prompts {
            state.prompts.insert(trace_id.clone(), data.clone());
        }
        if let Some(position) = delta.position {
            state.position = Some(position);
        }
        Ok(())
    }
}
