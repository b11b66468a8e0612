// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OTLP/JSON decoding and semantic classification.
//!
//! - [`attributes`] - typed attribute values and first-match lookups
//! - [`types`] - span and metric line envelopes
//! - [`keys`] - attribute keys and metric names
//!
//! Classification of spans always uses attribute presence. Span names are set
//! by the producer and change between agent versions.

pub mod attributes;
pub mod keys;
pub mod types;

pub use attributes::{
    first_nonzero_int_of, first_text_of, float_of, has_attribute, int_of, text_of, value_of,
    AttrValue, RawAttribute,
};
pub use types::{format_unix_nanos, MetricLine, MetricPoint, Span, SpanLine};

/// Whether a span represents one discrete agent action (a tool invocation).
pub fn is_tool_invocation(span: &Span) -> bool {
    let marked = |key: &str| {
        value_of(&span.attributes, key)
            .map(|value| value.to_string().contains(keys::TOOL_CALL_MARKER))
            .unwrap_or(false)
    };

    marked(keys::OPERATION_NAME)
        || marked(keys::OPERATION_ID)
        || has_attribute(&span.attributes, keys::TOOL_CALL_ID)
}

/// Whether a span carries the prompt sent to the model.
pub fn is_prompt_bearing(span: &Span) -> bool {
    has_attribute(&span.attributes, keys::PROMPT_MESSAGES)
        || has_attribute(&span.attributes, keys::PROMPT)
}

/// Call id of a tool-invocation span: explicit id attribute, else the span's own id.
pub fn call_id_of(span: &Span) -> String {
    first_text_of(&span.attributes, &[keys::TOOL_CALL_ID, keys::CALL_ID])
        .or_else(|| (!span.span_id.is_empty()).then(|| span.span_id.clone()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Semantic kind of a metric data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Lines added by an edit tool call.
    LocAdded,
    /// Lines deleted by an edit tool call.
    LocDeleted,
    /// A user (or policy) decision on a permission request.
    PermissionDecision,
    Other,
}

impl MetricKind {
    /// Classify a data point.
    ///
    /// The line-count instruments are matched by name first. Any other point
    /// is a permission decision when it carries the reply attribute or comes
    /// from the permission instrument.
    pub fn classify(point: &MetricPoint<'_>) -> Self {
        match point.metric_name {
            keys::METRIC_LOC_ADDED => Self::LocAdded,
            keys::METRIC_LOC_DELETED => Self::LocDeleted,
            keys::METRIC_PERMISSION_REQUESTS => Self::PermissionDecision,
            _ if has_attribute(point.attributes, keys::PERMISSION_REPLY) => {
                Self::PermissionDecision
            }
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_with(attrs: Vec<(&str, AttrValue)>) -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: "span-1".to_string(),
            attributes: attrs
                .into_iter()
                .map(|(k, v)| RawAttribute::new(k, v))
                .collect(),
            ..Default::default()
        }
    }

    fn s(v: &str) -> AttrValue {
        AttrValue::Str(v.to_string())
    }

    #[test]
    fn test_tool_invocation_by_id_presence() {
        let span = span_with(vec![(keys::TOOL_CALL_ID, s("c1"))]);
        assert!(is_tool_invocation(&span));
    }

    #[test]
    fn test_tool_invocation_by_operation_marker() {
        assert!(is_tool_invocation(&span_with(vec![(
            keys::OPERATION_NAME,
            s("ai.toolCall edit")
        )])));
        assert!(is_tool_invocation(&span_with(vec![(keys::OPERATION_ID, s("ai.toolCall"))])));
    }

    #[test]
    fn test_span_name_is_ignored() {
        let mut span = span_with(vec![]);
        span.name = "ai.toolCall".to_string();
        assert!(!is_tool_invocation(&span));
        assert!(!is_prompt_bearing(&span));
    }

    #[test]
    fn test_prompt_bearing() {
        assert!(is_prompt_bearing(&span_with(vec![(keys::PROMPT, s("{}"))])));
        assert!(is_prompt_bearing(&span_with(vec![(keys::PROMPT_MESSAGES, s("[]"))])));
        assert!(!is_prompt_bearing(&span_with(vec![(keys::RESPONSE_TEXT, s("ok"))])));
    }

    #[test]
    fn test_call_id_fallback_chain() {
        assert_eq!(
            call_id_of(&span_with(vec![(keys::TOOL_CALL_ID, s("c1")), (keys::CALL_ID, s("c2"))])),
            "c1"
        );
        assert_eq!(call_id_of(&span_with(vec![(keys::CALL_ID, s("c2"))])), "c2");
        assert_eq!(call_id_of(&span_with(vec![])), "span-1");

        let mut anonymous = span_with(vec![]);
        anonymous.span_id.clear();
        assert_eq!(call_id_of(&anonymous), "unknown");
    }

    #[test]
    fn test_metric_kind_classify() {
        let reply = vec![RawAttribute::new(keys::PERMISSION_REPLY, s("once"))];
        let none: Vec<RawAttribute> = vec![];

        fn point<'a>(name: &'a str, attrs: &'a [RawAttribute]) -> MetricPoint<'a> {
            MetricPoint {
                metric_name: name,
                attributes: attrs,
                numeric_value: 1.0,
                timestamp: None,
            }
        }

        assert_eq!(
            MetricKind::classify(&point("renamed.permission.metric", &reply)),
            MetricKind::PermissionDecision
        );
        assert_eq!(
            MetricKind::classify(&point(keys::METRIC_PERMISSION_REQUESTS, &none)),
            MetricKind::PermissionDecision
        );
        assert_eq!(
            MetricKind::classify(&point(keys::METRIC_LOC_ADDED, &none)),
            MetricKind::LocAdded
        );
        assert_eq!(
            MetricKind::classify(&point(keys::METRIC_LOC_DELETED, &none)),
            MetricKind::LocDeleted
        );
        assert_eq!(MetricKind::classify(&point("other", &none)), MetricKind::Other);

        // A reply attribute on a line-count point does not make it a decision.
        assert_eq!(
            MetricKind::classify(&point(keys::METRIC_LOC_ADDED, &reply)),
            MetricKind::LocAdded
        );
        assert_eq!(
            MetricKind::classify(&point(keys::METRIC_LOC_DELETED, &reply)),
            MetricKind::LocDeleted
        );
    }
}
