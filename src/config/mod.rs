// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for nbtelemetry.
//!
//! Handles loading and merging configuration from multiple sources:
//! - Global config: ~/.nbtelemetry/config.json
//! - Workspace config: .nbtelemetry.json, .nbtelemetry/config.json, or nbtelemetry.config.json
//! - Local config: .nbtelemetry.local.json (gitignored, for personal overrides)
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).
//! The merged `settings` seed the live [`Settings`] store the toggle
//! supervisors follow.

mod loader;
mod merger;
mod settings;
mod types;

pub use loader::{
    find_workspace_root, get_example_config, get_global_config_dir, get_global_config_path,
    init_config, load_config_file, load_global_config, load_local_config, load_workspace_config,
    save_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use settings::{
    default_settings, SettingEntry, Settings, EVENT_SETTINGS_KEY, HANDLER_SETTINGS_KEY,
};

pub use types::{
    RelayConfig, ResolvedConfig, ResolvedServerConfig, ServerConfig, WorkspaceConfig,
    DEFAULT_COLLECTOR_URL, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_SCROLL_DEBOUNCE_MS, DEFAULT_SERVER_BIND,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a workspace.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let local = load_local_config(workspace_root)?;

    Ok(merge_config(global, workspace, local, cli_options))
}
