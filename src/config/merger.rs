// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use serde_json::Value;

use super::types::{ResolvedConfig, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub collector_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub bind: Option<String>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.nbtelemetry.local.json)
/// 3. Workspace config (.nbtelemetry.json)
/// 4. Global config (~/.nbtelemetry/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ref url) = config.collector_url {
        result.collector_url = url.clone();
    }

    if config.token.is_some() {
        result.token = config.token.clone();
    }

    if config.user_id.is_some() {
        result.user_id = config.user_id.clone();
    }

    if config.relay.is_some() {
        result.relay = config.relay.clone();
    }

    if let Some(ms) = config.scroll_debounce_ms {
        result.scroll_debounce_ms = ms;
    }

    if let Some(ms) = config.retry_delay_ms {
        result.retry_delay_ms = ms;
    }

    if let Some(ms) = config.request_timeout_ms {
        result.request_timeout_ms = ms;
    }

    if let Some(ref settings) = config.settings {
        for (key, value) in settings {
            merge_setting(result.settings.entry(key.clone()).or_insert(Value::Null), value);
        }
    }

    if let Some(ref server) = config.server {
        if let Some(ref bind) = server.bind {
            result.server.bind = bind.clone();
        }
        if let Some(ref base_url) = server.base_url {
            result.server.base_url = base_url.clone();
        }
        if let Some(ref metadata) = server.metadata {
            result
                .server
                .metadata
                .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

/// Merge one settings key: URN entries of `overlay` replace those of
/// `base`; anything that is not an object on either side is replaced whole.
fn merge_setting(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (urn, entry) in overlay {
                base.insert(urn.clone(), entry.clone());
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref url) = cli.collector_url {
        result.collector_url = url.clone();
    }

    if cli.token.is_some() {
        result.token = cli.token.clone();
    }

    if cli.user_id.is_some() {
        result.user_id = cli.user_id.clone();
    }

    if let Some(ref bind) = cli.bind {
        result.server.bind = bind.clone();
    }
}
