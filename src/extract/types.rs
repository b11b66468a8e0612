// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Output record types and the extractor seam.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record produced by an extractor, ready to be written to a sink.
pub trait ExtractedRecord: Serialize {
    /// Identifies the record among the records of the same line.
    ///
    /// `None` falls back to the record's index within the line.
    fn discriminator(&self) -> Option<&str>;

    /// Event time, used for the run summary's time range.
    fn time(&self) -> Option<&str>;
}

/// A pure transform of one decoded line into zero or more records.
pub trait Extractor {
    type Line: DeserializeOwned;
    type Record: ExtractedRecord;

    fn extract(&self, line: &Self::Line) -> Vec<Self::Record>;
}

/// One tool invocation joined with the prompt that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub call_id: String,
    pub trace_id: String,

    pub session_id: Option<String>,
    pub user: Option<String>,
    pub file_path: Option<String>,
    pub language: Option<String>,

    pub prompt_messages: Value,
    pub user_prompt: String,
    pub ai_response: String,

    pub model: String,
    pub provider: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,

    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,

    pub tool_name: String,
    pub tool_args: String,

    pub time: Option<String>,
    pub duration_ms: f64,

    pub imported_at: String,
}

impl ExtractedRecord for PromptRecord {
    fn discriminator(&self) -> Option<&str> {
        Some(self.call_id.as_str()).filter(|id| *id != crate::correlate::merge::UNKNOWN)
    }

    fn time(&self) -> Option<&str> {
        self.time.as_deref()
    }
}

/// One permission decision with its line counts and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub accept: bool,
    pub ai_loc: i64,
    pub ai_char: i64,
    pub auto_approve_edit: bool,
    pub completion_tokens: i64,
    pub effective: bool,
    pub filepath: String,
    pub function_category: String,
    pub language: String,
    pub model: String,
    pub prompt_tokens: i64,
    pub sid: String,
    pub time: Option<String>,
    pub user: String,
    pub user_char: i64,
    pub user_loc: i64,
    pub version: String,
    pub call_id: Option<String>,
    pub reply_type: Option<String>,
    pub deleted_loc: i64,
    pub imported_at: String,
}

impl ExtractedRecord for MetricsRecord {
    fn discriminator(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    fn time(&self) -> Option<&str> {
        self.time.as_deref()
    }
}
