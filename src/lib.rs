// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! otelship - ships agent telemetry from OTLP JSON-lines files into a store.
//!
//! An exporter appends spans and metrics to two newline-delimited JSON
//! files. otelship tails both incrementally, joins tool invocations with
//! the prompts that caused them and the permission decisions taken on
//! them, and writes one record per tool call and one per decision. Every
//! run is safe to repeat: records carry a content-addressed identity and
//! cursors never move past data the store has confirmed.
//!
//! # Architecture
//!
//! - [`otlp`] - wire types and attribute decoding
//! - [`identity`] - content-addressed record identity
//! - [`cursor`] - stream cursors, file fingerprints, rotation detection
//! - [`correlate`] - call and prompt lookup tables built from the span stream
//! - [`extract`] - prompt and metrics record extraction
//! - [`ingest`] - resumable, idempotent tail of one stream
//! - [`pipeline`] - the two-phase run, status and reset
//! - [`store`] - cursor store, record sinks, persisted lookup (SQLite, memory)
//! - [`config`] - layered configuration
//! - [`telemetry`] - logging setup, run id, operation metrics
//! - [`error`] - error types
//!
//! # Example
//!
//! ```rust,ignore
//! use otelship::config::{load_config, CliOptions};
//! use otelship::pipeline::CorrelationPipeline;
//!
//! let config = load_config(&std::env::current_dir()?, CliOptions::default())?;
//! let pipeline = CorrelationPipeline::from_config(&config)?;
//! let report = pipeline.run().await?;
//! println!("{} new records", report.new_records());
//! ```

pub mod config;
pub mod correlate;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod identity;
pub mod ingest;
pub mod otlp;
pub mod pipeline;
pub mod store;
pub mod telemetry;

pub use error::{ConfigError, IngestError, Result, StoreError};
pub use pipeline::{CorrelationPipeline, PipelineOptions, RunReport, StatusReport};
pub use store::{MemoryStore, SqliteStore, Store};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
