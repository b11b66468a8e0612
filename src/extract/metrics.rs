// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics records: one per permission decision.
//!
//! Line-count points (added, deleted) of the same line are collected by call
//! id first and then joined onto the permission decisions. Language and model
//! are resolved by strict first-match priority:
//!
//! 1. the decision point's own attributes
//! 2. the paired lines-added point's attributes
//! 3. the prompt-side enrichment of the same call id
//! 4. language: the file extension; model: the call table's model
//!
//! Anything still unresolved is `unknown`.

use std::collections::HashMap;

use crate::correlate::merge::{first_known, UNKNOWN};
use crate::correlate::CorrelationLookup;
use crate::otlp::{
    format_unix_nanos, keys, text_of, value_of, AttrValue, MetricKind, MetricLine, MetricPoint,
    RawAttribute,
};

use super::language::infer_language;
use super::types::{Extractor, MetricsRecord};

/// Replies that count as the user accepting the change.
pub const ACCEPTED_REPLIES: &[&str] = &["once", "always", "auto", "accept", "auto_accept"];

const DEFAULT_VERSION: &str = "1.0.0";
const FUNCTION_CATEGORY: &str = "opencode";

/// Whether a permission reply accepts the change.
pub fn is_accepted(reply: Option<&str>) -> bool {
    reply.map_or(false, |r| ACCEPTED_REPLIES.contains(&r))
}

/// Line counts reported for one call.
#[derive(Debug, Default, Clone, Copy)]
struct LocData<'a> {
    added: i64,
    deleted: i64,
    /// Attributes of the lines-added point, used as the second fallback.
    attributes: Option<&'a [RawAttribute]>,
}

impl<'a> LocData<'a> {
    fn text(&self, key: &str) -> Option<String> {
        self.attributes.and_then(|attrs| text_of(attrs, key))
    }
}

/// Extracts [`MetricsRecord`]s from metric lines.
pub struct MetricsExtractor<'a> {
    lookup: &'a CorrelationLookup,
    imported_at: String,
}

impl<'a> MetricsExtractor<'a> {
    pub fn new(lookup: &'a CorrelationLookup, imported_at: impl Into<String>) -> Self {
        Self {
            lookup,
            imported_at: imported_at.into(),
        }
    }

    fn record_for(&self, point: &MetricPoint<'_>, loc: Option<&LocData<'_>>) -> MetricsRecord {
        let attrs = point.attributes;
        let call_id = text_of(attrs, keys::CALL_ID);
        let reply = text_of(attrs, keys::PERMISSION_REPLY);
        let accepted = is_accepted(reply.as_deref());
        let loc = loc.copied().unwrap_or_default();

        let call = call_id.as_deref().and_then(|id| self.lookup.call(id));
        let enrichment = call_id
            .as_deref()
            .and_then(|id| self.lookup.enrichment_for(id));

        let filepath = text_of(attrs, keys::FILE_PATH)
            .or_else(|| loc.text(keys::FILE_PATH))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let language = first_known([
            text_of(attrs, keys::LANGUAGE),
            loc.text(keys::LANGUAGE),
            enrichment.as_ref().and_then(|e| e.language.clone()),
            Some(infer_language(&filepath).to_string()),
        ])
        .unwrap_or_else(|| UNKNOWN.to_string());

        let model = first_known([
            text_of(attrs, keys::MODEL),
            loc.text(keys::MODEL),
            enrichment.as_ref().map(|e| e.model.clone()),
            call.and_then(|c| c.model.clone()),
        ])
        .unwrap_or_else(|| UNKNOWN.to_string());

        MetricsRecord {
            accept: accepted,
            ai_loc: if accepted { loc.added } else { 0 },
            ai_char: 0,
            auto_approve_edit: value_of(attrs, keys::AUTO_APPROVE_EDIT)
                .map_or(false, AttrValue::as_bool_like),
            completion_tokens: call.map_or(0, |c| c.output_tokens),
            effective: true,
            filepath,
            function_category: FUNCTION_CATEGORY.to_string(),
            language,
            model,
            prompt_tokens: call.map_or(0, |c| c.input_tokens),
            sid: text_of(attrs, keys::SESSION_ID)
                .or_else(|| loc.text(keys::SESSION_ID))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            time: format_unix_nanos(point.timestamp),
            user: text_of(attrs, keys::USER)
                .or_else(|| loc.text(keys::USER))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            user_char: 0,
            user_loc: 0,
            version: text_of(attrs, keys::VERSION)
                .or_else(|| loc.text(keys::VERSION))
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            call_id,
            reply_type: reply,
            deleted_loc: if accepted { loc.deleted } else { 0 },
            imported_at: self.imported_at.clone(),
        }
    }
}

impl Extractor for MetricsExtractor<'_> {
    type Line = MetricLine;
    type Record = MetricsRecord;

    fn extract(&self, line: &MetricLine) -> Vec<MetricsRecord> {
        let mut loc: HashMap<String, LocData<'_>> = HashMap::new();
        let mut decisions: Vec<MetricPoint<'_>> = Vec::new();

        for point in line.points() {
            let kind = MetricKind::classify(&point);
            if kind == MetricKind::PermissionDecision {
                decisions.push(point);
                continue;
            }

            let Some(call_id) = text_of(point.attributes, keys::CALL_ID) else {
                continue;
            };
            let count = point.numeric_value as i64;
            match kind {
                MetricKind::LocAdded => {
                    let entry = loc.entry(call_id).or_default();
                    entry.added = count;
                    entry.attributes = Some(point.attributes);
                }
                MetricKind::LocDeleted => {
                    loc.entry(call_id).or_default().deleted = count;
                }
                _ => {}
            }
        }

        decisions
            .iter()
            .map(|point| {
                let paired = text_of(point.attributes, keys::CALL_ID)
                    .and_then(|id| loc.get(&id));
                self.record_for(point, paired)
            })
            .collect()
    }
}
