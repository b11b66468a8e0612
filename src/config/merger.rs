// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{CorrelationMode, ResolvedConfig, WorkspaceConfig};

/// Command-line and environment overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub traces_file: Option<PathBuf>,
    pub metrics_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub rewind_bytes: Option<u64>,
    pub checkpoint_interval: Option<u64>,
    pub store_timeout_ms: Option<u64>,
    pub correlation_mode: Option<CorrelationMode>,
    pub dry_run: Option<bool>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.otelship.local.json)
/// 3. Workspace config (.otelship.json)
/// 4. Global config (~/.otelship/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, config);
    }

    apply_cli_options(&mut result, cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: WorkspaceConfig) {
    if let Some(path) = config.traces_file {
        result.traces_file = path;
    }
    if let Some(path) = config.metrics_file {
        result.metrics_file = path;
    }
    if let Some(path) = config.database_path {
        result.database_path = path;
    }
    if let Some(bytes) = config.rewind_bytes {
        result.rewind_bytes = bytes;
    }
    if let Some(interval) = config.checkpoint_interval {
        result.checkpoint_interval = interval;
    }
    if let Some(timeout) = config.store_timeout_ms {
        result.store_timeout_ms = timeout;
    }
    if let Some(mode) = config.correlation_mode {
        result.correlation_mode = mode;
    }
    if let Some(dry_run) = config.dry_run {
        result.dry_run = dry_run;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: CliOptions) {
    if let Some(path) = cli.traces_file {
        result.traces_file = path;
    }
    if let Some(path) = cli.metrics_file {
        result.metrics_file = path;
    }
    if let Some(path) = cli.database_path {
        result.database_path = path;
    }
    if let Some(bytes) = cli.rewind_bytes {
        result.rewind_bytes = bytes;
    }
    if let Some(interval) = cli.checkpoint_interval {
        result.checkpoint_interval = interval;
    }
    if let Some(timeout) = cli.store_timeout_ms {
        result.store_timeout_ms = timeout;
    }
    if let Some(mode) = cli.correlation_mode {
        result.correlation_mode = mode;
    }
    // A flag can only switch dry run on; files may still set it.
    if cli.dry_run == Some(true) {
        result.dry_run = true;
    }
}
