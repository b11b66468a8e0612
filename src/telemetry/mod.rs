// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and in-process metrics.
//!
//! - **Tracing**: structured logs on stderr, one root span per run
//! - **Metrics**: per-stream record counters and operation latencies
//!
//! ```rust,ignore
//! use otelship::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! Timed operations are guarded by the `telemetry` feature:
//!
//! ```rust,ignore
//! #[cfg(feature = "telemetry")]
//! let start = Instant::now();
//! // ...
//! #[cfg(feature = "telemetry")]
//! GLOBAL_METRICS.record_operation("store.insert", start.elapsed());
//! ```

mod init;
pub mod metrics;
mod run_id;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    Histogram, Metrics, MetricsSnapshot, OperationMetrics, StreamMetrics, GLOBAL_METRICS,
};
pub use run_id::RunId;
