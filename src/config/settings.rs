// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live feature-toggle settings.
//!
//! The settings document maps a key (`"event"`, `"handler"`) to a composite
//! object of `URN -> { "enable": bool }`. Capture units never read it
//! directly; a [`ToggleSupervisor`](crate::toggle::ToggleSupervisor)
//! resolves it for them and follows [`Settings::changed`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::error::ConfigError;
use crate::notebook::{lock, Signal};
use crate::sinks::{COLLECTOR_SINK_URN, RELAY_SINK_URN};
use crate::sources::SOURCE_REGISTRY;

use super::types::ResolvedConfig;

/// Settings key for event sources.
pub const EVENT_SETTINGS_KEY: &str = "event";

/// Settings key for delivery sinks.
pub const HANDLER_SETTINGS_KEY: &str = "handler";

/// One resolved settings key.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingEntry {
    /// The merged value for the key.
    pub composite: Value,
}

/// Externally owned, live settings store.
#[derive(Debug)]
pub struct Settings {
    values: Mutex<BTreeMap<String, Value>>,
    /// Fired after any key changes.
    pub changed: Signal<()>,
}

impl Settings {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
            changed: Signal::new("settings.changed"),
        }
    }

    /// Default toggles overlaid with the `settings` of a resolved config.
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let mut values = default_settings(config);
        for (key, overlay) in &config.settings {
            match (values.get_mut(key), overlay) {
                (Some(Value::Object(base)), Value::Object(overlay)) => {
                    base.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                _ => {
                    values.insert(key.clone(), overlay.clone());
                }
            }
        }
        Self::new(values)
    }

    /// Read one key.
    pub fn get(&self, key: &str) -> Result<SettingEntry, ConfigError> {
        lock(&self.values)
            .get(key)
            .cloned()
            .map(|composite| SettingEntry { composite })
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    /// Resolve `get(key).composite[urn].enable`.
    ///
    /// A missing URN entry or missing `enable` means disabled. A missing key
    /// or a value of the wrong shape is an error.
    pub fn is_enabled(&self, key: &str, urn: &str) -> Result<bool, ConfigError> {
        let entry = self.get(key)?;
        let composite = entry
            .composite
            .as_object()
            .ok_or_else(|| ConfigError::invalid(key, "composite is not an object"))?;

        let Some(unit) = composite.get(urn) else {
            return Ok(false);
        };
        let unit = unit
            .as_object()
            .ok_or_else(|| ConfigError::invalid(urn, "entry is not an object"))?;

        match unit.get("enable") {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(enable)) => Ok(*enable),
            Some(other) => Err(ConfigError::invalid(
                format!("{urn}.enable"),
                format!("expected a boolean, got {other}"),
            )),
        }
    }

    /// Replace a key and notify subscribers.
    pub fn set(&self, key: impl Into<String>, composite: Value) {
        lock(&self.values).insert(key.into(), composite);
        self.changed.emit(&());
    }

    /// Set one unit's `enable` flag and notify subscribers.
    pub fn set_enabled(&self, key: &str, urn: &str, enable: bool) {
        {
            let mut values = lock(&self.values);
            let composite = values
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !composite.is_object() {
                *composite = Value::Object(Map::new());
            }
            if let Some(map) = composite.as_object_mut() {
                map.insert(urn.to_string(), json!({ "enable": enable }));
            }
        }
        self.changed.emit(&());
    }

    /// Remove a key and notify subscribers.
    pub fn remove(&self, key: &str) {
        lock(&self.values).remove(key);
        self.changed.emit(&());
    }

    /// Copy of the whole document.
    pub fn to_json(&self) -> Value {
        Value::Object(
            lock(&self.values)
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Every registered event source and the collector sink enabled; the relay
/// sink enabled when a relay is configured.
pub fn default_settings(config: &ResolvedConfig) -> BTreeMap<String, Value> {
    let events: Map<String, Value> = SOURCE_REGISTRY
        .iter()
        .map(|registration| (registration.urn.to_string(), json!({ "enable": true })))
        .collect();

    let mut handlers = Map::new();
    handlers.insert(COLLECTOR_SINK_URN.to_string(), json!({ "enable": true }));
    handlers.insert(
        RELAY_SINK_URN.to_string(),
        json!({ "enable": config.relay.is_some() }),
    );

    let mut values = BTreeMap::new();
    values.insert(EVENT_SETTINGS_KEY.to_string(), Value::Object(events));
    values.insert(HANDLER_SETTINGS_KEY.to_string(), Value::Object(handlers));
    values
}
