// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for otelship.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.otelship/config.json
//! - Workspace config: .otelship.json, .otelship/config.json, or otelship.config.yaml
//! - Local config: .otelship.local.json (for per-machine overrides)
//! - CLI options: command-line arguments and `OTELSHIP_*` environment variables
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    find_workspace_root, get_global_config_dir, get_global_config_path, load_config_file,
    load_global_config, load_local_config, load_workspace_config, save_workspace_config,
    CONFIG_FILES, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    CorrelationMode, ResolvedConfig, WorkspaceConfig, DEFAULT_DATABASE_FILE, DEFAULT_EXPORT_DIR,
    DEFAULT_STORE_TIMEOUT_MS, OTELSHIP_DIR,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load, merge and validate all configuration sources for a workspace.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    load_config_with_global(workspace_root, global, cli_options)
}

/// Like [`load_config`] with an explicit global layer.
pub fn load_config_with_global(
    workspace_root: &Path,
    global: Option<WorkspaceConfig>,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let workspace = load_workspace_config(workspace_root)?;
    let local = load_local_config(workspace_root)?;

    let resolved = merge_config(global, workspace, local, cli_options);
    resolved.validate()?;
    Ok(resolved)
}
