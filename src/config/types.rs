// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of file-level and resolved configuration,
//! supporting JSON and YAML formats.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ingest::{CHECKPOINT_INTERVAL, REWIND_WINDOW};

/// Directory under the home directory holding global config and the default database.
pub const OTELSHIP_DIR: &str = ".otelship";

/// Default SQLite file name inside [`OTELSHIP_DIR`].
pub const DEFAULT_DATABASE_FILE: &str = "telemetry.db";

/// Default exporter output directory, relative to the home directory.
pub const DEFAULT_EXPORT_DIR: &str = "opencode/otel-data";

pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

/// How the correlation lookup is built each run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationMode {
    /// Rebuild from the whole span stream every run.
    #[default]
    FullScan,
    /// Load persisted tables and scan only the region about to be tailed.
    Incremental,
}

impl CorrelationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullScan => "full-scan",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for CorrelationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full-scan" | "full_scan" | "full" => Ok(Self::FullScan),
            "incremental" => Ok(Self::Incremental),
            other => Err(ConfigError::invalid(
                "correlationMode",
                format!("expected 'full-scan' or 'incremental', got '{}'", other),
            )),
        }
    }
}

/// Config as written in a file. Every field is optional.
/// Can be defined in .otelship.json, .otelship/config.json or otelship.config.yaml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Span stream written by the exporter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces_file: Option<PathBuf>,

    /// Metric stream written by the exporter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_file: Option<PathBuf>,

    /// SQLite database holding cursors, sinks and lookup tables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewind_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<u64>,

    /// Per-operation store timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_mode: Option<CorrelationMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

/// Fully resolved configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub traces_file: PathBuf,
    pub metrics_file: PathBuf,
    pub database_path: PathBuf,
    pub rewind_bytes: u64,
    pub checkpoint_interval: u64,
    pub store_timeout_ms: u64,
    pub correlation_mode: CorrelationMode,
    pub dry_run: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let export_dir = home.join(DEFAULT_EXPORT_DIR);
        Self {
            traces_file: export_dir.join("traces.jsonl"),
            metrics_file: export_dir.join("metrics.jsonl"),
            database_path: home.join(OTELSHIP_DIR).join(DEFAULT_DATABASE_FILE),
            rewind_bytes: REWIND_WINDOW,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            correlation_mode: CorrelationMode::FullScan,
            dry_run: false,
        }
    }
}

impl ResolvedConfig {
    /// Reject values the ingestor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::invalid("checkpointInterval", "must be greater than 0"));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::invalid("storeTimeoutMs", "must be greater than 0"));
        }
        // The first line after a rewind is always discarded as partial, so the
        // window must reach at least one byte behind the saved offset.
        if self.rewind_bytes == 0 {
            return Err(ConfigError::invalid("rewindBytes", "must be greater than 0"));
        }
        Ok(())
    }
}
