// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Line envelopes for the span and metric streams.
//!
//! Every line of `traces.jsonl` is one OTLP/JSON export request
//! (`{"resourceSpans": [...]}`), and every line of `metrics.jsonl` is one
//! metrics export request (`{"resourceMetrics": [...]}`). All fields default,
//! so any JSON object decodes; only non-object lines fail.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::attributes::{de, RawAttribute};

// ============================================================================
// SPAN STREAM
// ============================================================================

/// One decoded line of the span stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpanLine {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceSpans {
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScopeSpans {
    pub spans: Vec<Span>,
}

/// A timed operation with typed attributes. Read-only input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    #[serde(rename = "startTimeUnixNano", deserialize_with = "de::lenient_u64")]
    pub start_time: Option<u64>,
    #[serde(rename = "endTimeUnixNano", deserialize_with = "de::lenient_u64")]
    pub end_time: Option<u64>,
    pub attributes: Vec<RawAttribute>,
}

impl Span {
    /// Duration in milliseconds; zero when the end does not follow the start.
    pub fn duration_ms(&self) -> f64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end > start => (end - start) as f64 / 1_000_000.0,
            _ => 0.0,
        }
    }
}

impl SpanLine {
    /// Iterate every span in the line, in file order.
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .flat_map(|ss| ss.spans.iter())
    }
}

// ============================================================================
// METRIC STREAM
// ============================================================================

/// One decoded line of the metric stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricLine {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMetrics {
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScopeMetrics {
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Metric {
    pub name: String,
    pub sum: Option<Sum>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sum {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberDataPoint {
    pub attributes: Vec<RawAttribute>,
    #[serde(deserialize_with = "de::lenient_f64")]
    pub as_double: Option<f64>,
    #[serde(deserialize_with = "de::lenient_i64")]
    pub as_int: Option<i64>,
    #[serde(rename = "timeUnixNano", deserialize_with = "de::lenient_u64")]
    pub time: Option<u64>,
}

/// A flattened view of one sum data point together with its metric name.
#[derive(Debug, Clone, Copy)]
pub struct MetricPoint<'a> {
    pub metric_name: &'a str,
    pub attributes: &'a [RawAttribute],
    pub numeric_value: f64,
    pub timestamp: Option<u64>,
}

impl MetricLine {
    /// Iterate every sum data point in the line, in file order.
    pub fn points(&self) -> impl Iterator<Item = MetricPoint<'_>> {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
            .flat_map(|metric| {
                metric
                    .sum
                    .iter()
                    .flat_map(|sum| sum.data_points.iter())
                    .map(move |dp| MetricPoint {
                        metric_name: &metric.name,
                        attributes: &dp.attributes,
                        numeric_value: dp.numeric_value(),
                        timestamp: dp.time,
                    })
            })
    }
}

impl NumberDataPoint {
    /// `asDouble` when non-zero, else `asInt`, else zero.
    pub fn numeric_value(&self) -> f64 {
        match (self.as_double, self.as_int) {
            (Some(d), _) if d != 0.0 => d,
            (_, Some(i)) => i as f64,
            _ => 0.0,
        }
    }
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Render a nanosecond epoch timestamp as `YYYY-MM-DDTHH:MM:SS+00:00`.
pub fn format_unix_nanos(nanos: Option<u64>) -> Option<String> {
    let nanos = i64::try_from(nanos?).ok()?;
    let dt: DateTime<Utc> = DateTime::from_timestamp_nanos(nanos);
    Some(dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPAN_LINE: &str = r#"{"resourceSpans":[{"scopeSpans":[{"spans":[
        {"traceId":"t1","spanId":"s1","name":"ai.toolCall","startTimeUnixNano":"1700000000000000000","endTimeUnixNano":"1700000000250000000",
         "attributes":[{"key":"ai.toolCall.id","value":{"stringValue":"c1"}}]},
        {"traceId":"t1","spanId":"s2","startTimeUnixNano":1700000000000000000}
    ]}]}]}"#;

    #[test]
    fn test_span_line_decodes() {
        let line: SpanLine = serde_json::from_str(SPAN_LINE).unwrap();
        let spans: Vec<&Span> = line.spans().collect();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].trace_id, "t1");
        assert_eq!(spans[0].span_id, "s1");
        assert_eq!(spans[0].start_time, Some(1_700_000_000_000_000_000));
        assert_eq!(spans[1].end_time, None);
        assert_eq!(spans[0].attributes.len(), 1);
    }

    #[test]
    fn test_duration_ms() {
        let line: SpanLine = serde_json::from_str(SPAN_LINE).unwrap();
        let spans: Vec<&Span> = line.spans().collect();
        assert_eq!(spans[0].duration_ms(), 250.0);
        assert_eq!(spans[1].duration_ms(), 0.0);

        let backwards = Span {
            start_time: Some(10),
            end_time: Some(5),
            ..Default::default()
        };
        assert_eq!(backwards.duration_ms(), 0.0);
    }

    #[test]
    fn test_empty_object_decodes() {
        let line: SpanLine = serde_json::from_str("{}").unwrap();
        assert_eq!(line.spans().count(), 0);
        let line: MetricLine = serde_json::from_str(r#"{"resourceSpans":[]}"#).unwrap();
        assert_eq!(line.points().count(), 0);
    }

    #[test]
    fn test_non_object_fails() {
        assert!(serde_json::from_str::<SpanLine>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<MetricLine>("\"text\"").is_err());
    }

    #[test]
    fn test_metric_points() {
        let json = r#"{"resourceMetrics":[{"scopeMetrics":[{"metrics":[
            {"name":"opencode.tool.loc.added","sum":{"dataPoints":[
                {"attributes":[{"key":"call.id","value":{"stringValue":"c1"}}],"asInt":"5","timeUnixNano":"1700000000000000000"},
                {"attributes":[],"asDouble":2.0}
            ]}},
            {"name":"gauge.without.sum"}
        ]}]}]}"#;
        let line: MetricLine = serde_json::from_str(json).unwrap();
        let points: Vec<MetricPoint<'_>> = line.points().collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].metric_name, "opencode.tool.loc.added");
        assert_eq!(points[0].numeric_value, 5.0);
        assert_eq!(points[0].timestamp, Some(1_700_000_000_000_000_000));
        assert_eq!(points[1].numeric_value, 2.0);
    }

    #[test]
    fn test_numeric_value_prefers_nonzero_double() {
        let dp = NumberDataPoint {
            as_double: Some(0.0),
            as_int: Some(3),
            ..Default::default()
        };
        assert_eq!(dp.numeric_value(), 3.0);
    }

    #[test]
    fn test_format_unix_nanos() {
        assert_eq!(
            format_unix_nanos(Some(1_700_000_000_123_000_000)),
            Some("2023-11-14T22:13:20+00:00".to_string())
        );
        assert_eq!(format_unix_nanos(None), None);
        assert_eq!(format_unix_nanos(Some(0)), Some("1970-01-01T00:00:00+00:00".to_string()));
    }
}
