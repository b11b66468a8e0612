// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Prompt records: one per tool invocation, joined with its trace's prompt.

use std::collections::HashMap;

use serde_json::Value;

use crate::correlate::merge::UNKNOWN;
use crate::correlate::{CorrelationLookup, PromptData};
use crate::otlp::{
    call_id_of, first_text_of, format_unix_nanos, is_tool_invocation, keys, text_of, Span,
    SpanLine,
};

use super::types::{Extractor, PromptRecord};

/// Extracts [`PromptRecord`]s from span lines.
///
/// Prompt and response data always come from the lookup, never from the line
/// alone: the prompt span of a trace may sit on another line.
pub struct PromptExtractor<'a> {
    lookup: &'a CorrelationLookup,
    imported_at: String,
}

impl<'a> PromptExtractor<'a> {
    pub fn new(lookup: &'a CorrelationLookup, imported_at: impl Into<String>) -> Self {
        Self {
            lookup,
            imported_at: imported_at.into(),
        }
    }

    fn record_for(&self, trace_id: &str, span: &Span, prompt: &PromptData) -> PromptRecord {
        let attrs = &span.attributes;

        let prompt_messages = match (&prompt.prompt_messages, &prompt.prompt_messages_raw) {
            (Some(messages), _) => messages.clone(),
            (None, Some(raw)) => Value::String(raw.clone()),
            (None, None) => Value::Array(Vec::new()),
        };

        PromptRecord {
            call_id: call_id_of(span),
            trace_id: trace_id.to_string(),
            session_id: text_of(attrs, keys::SESSION_ID),
            user: text_of(attrs, keys::USER),
            file_path: text_of(attrs, keys::FILE_PATH),
            language: text_of(attrs, keys::LANGUAGE),
            prompt_messages,
            user_prompt: prompt.user_prompt(),
            ai_response: prompt.response_text.clone().unwrap_or_default(),
            model: prompt.model_or_unknown(),
            provider: prompt
                .provider
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
            prompt_tokens: prompt.prompt_tokens,
            completion_tokens: prompt.completion_tokens,
            total_tokens: prompt.prompt_tokens.saturating_add(prompt.completion_tokens),
            tool_name: first_text_of(attrs, &[keys::TOOL_CALL_NAME, keys::TOOL_NAME])
                .unwrap_or_else(|| UNKNOWN.to_string()),
            tool_args: text_of(attrs, keys::TOOL_CALL_ARGS).unwrap_or_else(|| "{}".to_string()),
            time: format_unix_nanos(span.start_time),
            duration_ms: span.duration_ms(),
            imported_at: self.imported_at.clone(),
        }
    }
}

impl Extractor for PromptExtractor<'_> {
    type Line = SpanLine;
    type Record = PromptRecord;

    fn extract(&self, line: &SpanLine) -> Vec<PromptRecord> {
        let empty = PromptData::default();
        let mut records = Vec::new();

        for (trace_id, spans) in group_by_trace(line) {
            let tool_spans: Vec<&Span> = spans
                .into_iter()
                .filter(|span| is_tool_invocation(span))
                .collect();
            if tool_spans.is_empty() {
                continue;
            }

            let prompt = self.lookup.prompt_for_trace(trace_id).unwrap_or(&empty);
            records.extend(
                tool_spans
                    .into_iter()
                    .map(|span| self.record_for(trace_id, span, prompt)),
            );
        }

        records
    }
}

/// Spans of a line grouped by trace id, in order of first appearance.
fn group_by_trace(line: &SpanLine) -> Vec<(&str, Vec<&Span>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&Span>)> = Vec::new();

    for span in line.spans() {
        let trace_id = span.trace_id.as_str();
        match index.get(trace_id) {
            Some(&i) => groups[i].1.push(span),
            None => {
                index.insert(trace_id, groups.len());
                groups.push((trace_id, vec![span]));
            }
        }
    }

    groups
}
