// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default collection endpoint base; envelopes go to `<base>/event`.
pub const DEFAULT_COLLECTOR_URL: &str = "http://localhost:8888/nbtelemetry";

/// Default quiet period before a scroll burst is evaluated.
pub const DEFAULT_SCROLL_DEBOUNCE_MS: u64 = 1000;

/// Default delay between delivery attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default bind address of the collection server.
pub const DEFAULT_SERVER_BIND: &str = "127.0.0.1:8888";

/// Workspace configuration for nbtelemetry.
/// Can be defined in .nbtelemetry.json or .nbtelemetry/config.json.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Base URL of the collection endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector_url: Option<String>,

    /// Session token sent as `Authorization: token <token>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// User id stamped on every envelope (defaults to the token)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Optional relay the messages go through before the collector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayConfig>,

    /// Scroll debounce window in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_debounce_ms: Option<u64>,

    /// Delay between delivery retries in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    /// HTTP request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    /// Feature toggles: settings key -> URN -> `{ "enable": bool }`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<BTreeMap<String, Value>>,

    /// Collection server settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// API-gateway style relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    pub url: String,
    pub bucket: String,
    pub path: String,
}

/// Collection server settings as written in config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Path prefix in front of `/nbtelemetry/event`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Metadata attached to every received event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Fully resolved configuration with defaults applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub collector_url: String,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub relay: Option<RelayConfig>,
    pub scroll_debounce_ms: u64,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub settings: BTreeMap<String, Value>,
    pub server: ResolvedServerConfig,
}

/// Resolved collection server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedServerConfig {
    pub bind: String,
    pub base_url: String,
    pub metadata: Map<String, Value>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            token: None,
            user_id: None,
            relay: None,
            scroll_debounce_ms: DEFAULT_SCROLL_DEBOUNCE_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            settings: BTreeMap::new(),
            server: ResolvedServerConfig::default(),
        }
    }
}

impl Default for ResolvedServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_SERVER_BIND.to_string(),
            base_url: "/".to_string(),
            metadata: Map::new(),
        }
    }
}

impl ResolvedConfig {
    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// User id for envelopes: explicit id, else the session token.
    pub fn effective_user_id(&self) -> String {
        self.user_id
            .clone()
            .or_else(|| self.token.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_config_camel_case() {
        let config: WorkspaceConfig = serde_json::from_str(
            r#"{
                "collectorUrl": "http://collector/api",
                "scrollDebounceMs": 250,
                "relay": {"url": "https://relay", "bucket": "b", "path": "p"},
                "settings": {"event": {"urn:x": {"enable": false}}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.collector_url.as_deref(), Some("http://collector/api"));
        assert_eq!(config.scroll_debounce_ms, Some(250));
        assert_eq!(config.relay.unwrap().bucket, "b");
        assert!(config.settings.unwrap().contains_key("event"));
    }

    #[test]
    fn test_resolved_defaults() {
        let config = ResolvedConfig::default();
        assert_eq!(config.collector_url, DEFAULT_COLLECTOR_URL);
        assert_eq!(config.scroll_debounce(), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.server.bind, DEFAULT_SERVER_BIND);
    }

    #[test]
    fn test_effective_user_id() {
        let mut config = ResolvedConfig::default();
        assert_eq!(config.effective_user_id(), "");
        config.token = Some("tok".to_string());
        assert_eq!(config.effective_user_id(), "tok");
        config.user_id = Some("alice".to_string());
        assert_eq!(config.effective_user_id(), "alice");
    }

    #[test]
    fn test_skip_none_on_serialize() {
        let json = serde_json::to_string(&WorkspaceConfig::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
