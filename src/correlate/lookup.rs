// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cross-line lookup tables built from the span stream.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::otlp::{
    call_id_of, first_nonzero_int_of, float_of, format_unix_nanos, int_of, is_prompt_bearing,
    is_tool_invocation, keys, text_of, value_of, AttrValue, Span, SpanLine,
};

use super::merge::{merge_field, UNKNOWN};

// ============================================================================
// CALL LOOKUP (pass A)
// ============================================================================

/// What the span stream says about one tool invocation, keyed by call id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub model: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub session_id: Option<String>,
    pub language: Option<String>,
    pub file_path: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl CallInfo {
    /// Extract call data from a tool-invocation span.
    pub fn from_span(span: &Span) -> Self {
        let attrs = &span.attributes;
        Self {
            trace_id: non_empty(&span.trace_id),
            span_id: non_empty(&span.span_id),
            model: text_of(attrs, keys::GEN_AI_REQUEST_MODEL),
            input_tokens: int_of(attrs, keys::GEN_AI_INPUT_TOKENS).unwrap_or(0),
            output_tokens: int_of(attrs, keys::GEN_AI_OUTPUT_TOKENS).unwrap_or(0),
            session_id: text_of(attrs, keys::SESSION_ID),
            language: text_of(attrs, keys::LANGUAGE),
            file_path: text_of(attrs, keys::FILE_PATH),
            start_time: format_unix_nanos(span.start_time),
            end_time: format_unix_nanos(span.end_time),
        }
    }

    /// Non-empty-wins merge; returns whether anything changed.
    pub fn merge(&mut self, other: CallInfo) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut self.trace_id, other.trace_id);
        changed |= merge_field(&mut self.span_id, other.span_id);
        changed |= merge_field(&mut self.model, other.model);
        changed |= merge_field(&mut self.input_tokens, other.input_tokens);
        changed |= merge_field(&mut self.output_tokens, other.output_tokens);
        changed |= merge_field(&mut self.session_id, other.session_id);
        changed |= merge_field(&mut self.language, other.language);
        changed |= merge_field(&mut self.file_path, other.file_path);
        changed |= merge_field(&mut self.start_time, other.start_time);
        changed |= merge_field(&mut self.end_time, other.end_time);
        changed
    }

    pub fn total_tokens(&self) -> i64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

// ============================================================================
// PROMPT LOOKUP (pass B)
// ============================================================================

/// Prompt and response data of one trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptData {
    /// Decoded message list.
    pub prompt_messages: Option<Value>,
    /// Prompt text that did not decode as JSON.
    pub prompt_messages_raw: Option<String>,
    pub response_text: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
}

impl PromptData {
    /// Extract prompt data from a prompt-bearing span.
    pub fn from_span(span: &Span) -> Self {
        let attrs = &span.attributes;
        let (prompt_messages, prompt_messages_raw) = decode_messages(
            value_of(attrs, keys::PROMPT_MESSAGES).or_else(|| value_of(attrs, keys::PROMPT)),
        );

        Self {
            prompt_messages,
            prompt_messages_raw,
            response_text: text_of(attrs, keys::RESPONSE_TEXT),
            prompt_tokens: first_nonzero_int_of(
                attrs,
                &[keys::USAGE_INPUT_TOKENS, keys::GEN_AI_INPUT_TOKENS],
            )
            .unwrap_or(0),
            completion_tokens: first_nonzero_int_of(
                attrs,
                &[keys::USAGE_OUTPUT_TOKENS, keys::GEN_AI_OUTPUT_TOKENS],
            )
            .unwrap_or(0),
            model: text_of(attrs, keys::GEN_AI_REQUEST_MODEL),
            provider: text_of(attrs, keys::GEN_AI_SYSTEM),
            temperature: float_of(attrs, keys::GEN_AI_TEMPERATURE),
            max_tokens: int_of(attrs, keys::GEN_AI_MAX_TOKENS),
        }
    }

    /// Non-empty-wins merge; returns whether anything changed.
    pub fn merge(&mut self, other: PromptData) -> bool {
        let mut changed = false;
        changed |= merge_field(&mut self.prompt_messages, other.prompt_messages);
        changed |= merge_field(&mut self.prompt_messages_raw, other.prompt_messages_raw);
        changed |= merge_field(&mut self.response_text, other.response_text);
        changed |= merge_field(&mut self.prompt_tokens, other.prompt_tokens);
        changed |= merge_field(&mut self.completion_tokens, other.completion_tokens);
        changed |= merge_field(&mut self.model, other.model);
        changed |= merge_field(&mut self.provider, other.provider);
        changed |= merge_field(&mut self.temperature, other.temperature);
        changed |= merge_field(&mut self.max_tokens, other.max_tokens);
        changed
    }

    /// Text of the first message with role `user`.
    ///
    /// String content is taken as-is; a list of parts is reduced to the
    /// space-joined `text` of its `type == "text"` entries.
    pub fn user_prompt(&self) -> String {
        let Some(Value::Array(messages)) = &self.prompt_messages else {
            return String::new();
        };

        messages
            .iter()
            .find(|msg| msg.get("role").and_then(Value::as_str) == Some("user"))
            .map(|msg| match msg.get("content") {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Array(parts)) => parts
                    .iter()
                    .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                    .map(|part| part.get("text").and_then(Value::as_str).unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join(" "),
                _ => String::new(),
            })
            .unwrap_or_default()
    }

    /// Model name, or `unknown`.
    pub fn model_or_unknown(&self) -> String {
        self.model.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }
}

fn decode_messages(value: Option<&AttrValue>) -> (Option<Value>, Option<String>) {
    match value {
        Some(AttrValue::Str(text)) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => (Some(parsed), None),
            Err(_) => (None, Some(text.clone())),
        },
        Some(array @ AttrValue::Array(_)) => (Some(array.to_json()), None),
        Some(other) => (None, other.to_text()),
        None => (None, None),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// ============================================================================
// CALL ENRICHMENT
// ============================================================================

/// Prompt-side view of one call, used to enrich metrics records.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEnrichment {
    pub model: String,
    pub language: Option<String>,
    pub file_path: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

// ============================================================================
// LOOKUP TABLES
// ============================================================================

/// How far into the span stream a persisted lookup has been folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPosition {
    pub generation: u64,
    /// Offset just past the last complete line scanned.
    pub offset: u64,
}

/// Entries changed since the last [`CorrelationLookup::take_changes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupDelta {
    pub calls: Vec<(String, CallInfo)>,
    pub prompts: Vec<(String, PromptData)>,
    /// New scan position, when it moved.
    pub position: Option<ScanPosition>,
}

impl LookupDelta {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.prompts.is_empty() && self.position.is_none()
    }

    pub fn len(&self) -> usize {
        self.calls.len() + self.prompts.len()
    }
}

/// Call-id and trace-id keyed tables joining the two streams.
#[derive(Debug, Clone, Default)]
pub struct CorrelationLookup {
    calls: HashMap<String, CallInfo>,
    prompts: HashMap<String, PromptData>,
    changed_calls: BTreeSet<String>,
    changed_prompts: BTreeSet<String>,
    position: Option<ScanPosition>,
    position_changed: bool,
}

impl CorrelationLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries. Nothing is marked as changed.
    pub fn from_parts(
        calls: HashMap<String, CallInfo>,
        prompts: HashMap<String, PromptData>,
    ) -> Self {
        Self {
            calls,
            prompts,
            ..Self::default()
        }
    }

    /// Attach the persisted scan position. Not marked as changed.
    pub fn with_position(mut self, position: Option<ScanPosition>) -> Self {
        self.position = position;
        self
    }

    /// Where the span stream was last scanned up to, if ever.
    pub fn position(&self) -> Option<ScanPosition> {
        self.position
    }

    pub fn set_position(&mut self, position: ScanPosition) {
        if self.position != Some(position) {
            self.position = Some(position);
            self.position_changed = true;
        }
    }

    /// Fold every span of a decoded line into the tables.
    pub fn observe_line(&mut self, line: &SpanLine) {
        for span in line.spans() {
            self.observe_span(span);
        }
    }

    /// Fold one span into the tables.
    ///
    /// A span can be both a tool invocation and prompt-bearing; it then
    /// contributes to both tables.
    pub fn observe_span(&mut self, span: &Span) {
        if is_tool_invocation(span) {
            self.merge_call(call_id_of(span), CallInfo::from_span(span));
        }
        if is_prompt_bearing(span) && !span.trace_id.is_empty() {
            self.merge_prompt(span.trace_id.clone(), PromptData::from_span(span));
        }
    }

    /// Merge call data under `call_id`.
    pub fn merge_call(&mut self, call_id: String, info: CallInfo) {
        let changed = match self.calls.get_mut(&call_id) {
            Some(existing) => existing.merge(info),
            None => {
                self.calls.insert(call_id.clone(), info);
                true
            }
        };
        if changed {
            self.changed_calls.insert(call_id);
        }
    }

    /// Merge prompt data under `trace_id`.
    pub fn merge_prompt(&mut self, trace_id: String, data: PromptData) {
        let changed = match self.prompts.get_mut(&trace_id) {
            Some(existing) => existing.merge(data),
            None => {
                self.prompts.insert(trace_id.clone(), data);
                true
            }
        };
        if changed {
            self.changed_prompts.insert(trace_id);
        }
    }

    pub fn call(&self, call_id: &str) -> Option<&CallInfo> {
        self.calls.get(call_id)
    }

    pub fn prompt_for_trace(&self, trace_id: &str) -> Option<&PromptData> {
        self.prompts.get(trace_id)
    }

    /// Join a call with the prompt data of its trace.
    pub fn enrichment_for(&self, call_id: &str) -> Option<CallEnrichment> {
        let call = self.calls.get(call_id)?;
        let prompt = call
            .trace_id
            .as_deref()
            .and_then(|trace_id| self.prompts.get(trace_id));

        Some(CallEnrichment {
            model: prompt
                .map(PromptData::model_or_unknown)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            language: call.language.clone(),
            file_path: call.file_path.clone(),
            prompt_tokens: prompt.map(|p| p.prompt_tokens).unwrap_or(0),
            completion_tokens: prompt.map(|p| p.completion_tokens).unwrap_or(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.prompts.is_empty()
    }

    /// Drain the set of changed entries, for persisting.
    pub fn take_changes(&mut self) -> LookupDelta {
        let calls = std::mem::take(&mut self.changed_calls)
            .into_iter()
            .filter_map(|id| self.calls.get(&id).map(|info| (id, info.clone())))
            .collect();
        let prompts = std::mem::take(&mut self.changed_prompts)
            .into_iter()
            .filter_map(|id| self.prompts.get(&id).map(|data| (id, data.clone())))
            .collect();
        let position = if std::mem::take(&mut self.position_changed) {
            self.position
        } else {
            None
        };
        LookupDelta {
            calls,
            prompts,
            position,
        }
    }
}
