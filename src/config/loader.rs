// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::{RelayConfig, WorkspaceConfig};

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".nbtelemetry.json",
    ".nbtelemetry.yaml",
    ".nbtelemetry/config.json",
    "nbtelemetry.config.json",
];

/// Local config file name (for per-directory overrides).
pub const LOCAL_CONFIG_FILE: &str = ".nbtelemetry.local.json";

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".nbtelemetry";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.nbtelemetry/config.json.
pub fn load_global_config() -> Result<Option<WorkspaceConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration from the workspace root.
///
/// The first file of [`CONFIG_FILES`] that exists wins.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load local configuration from .nbtelemetry.local.json.
pub fn load_local_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    let path = workspace_root.join(LOCAL_CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Write `config` to the primary workspace config file.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &WorkspaceConfig,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(CONFIG_FILES[0]);
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    Ok(path)
}

/// Create the workspace config file from `config` or the example.
///
/// Refuses to overwrite an existing file.
pub fn init_config(
    workspace_root: &Path,
    config: Option<WorkspaceConfig>,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(CONFIG_FILES[0]);
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.display().to_string()));
    }
    let config = config.unwrap_or_else(get_example_config);
    save_workspace_config(workspace_root, &config)
}

/// Find the workspace root by searching for config files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing a config file or reaches the filesystem root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        for filename in CONFIG_FILES {
            if current.join(filename).exists() {
                return Some(current);
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Get an example configuration.
pub fn get_example_config() -> WorkspaceConfig {
    WorkspaceConfig {
        collector_url: Some(super::types::DEFAULT_COLLECTOR_URL.to_string()),
        user_id: Some("student-01".to_string()),
        relay: Some(RelayConfig {
            url: "https://example.execute-api.us-east-1.amazonaws.com/prod".to_string(),
            bucket: "telemetry-bucket".to_string(),
            path: "notebooks".to_string(),
        }),
        scroll_debounce_ms: Some(super::types::DEFAULT_SCROLL_DEBOUNCE_MS),
        retry_delay_ms: Some(super::types::DEFAULT_RETRY_DELAY_MS),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_files_order() {
        assert_eq!(CONFIG_FILES[0], ".nbtelemetry.json");
        assert!(CONFIG_FILES.contains(&".nbtelemetry.yaml"));
    }

    #[test]
    fn test_global_config_dir() {
        if let Some(dir) = get_global_config_dir() {
            assert!(dir.ends_with(".nbtelemetry"));
        }
    }

    #[test]
    fn test_load_workspace_config_not_found() {
        let temp = TempDir::new().unwrap();
        let result = load_workspace_config(temp.path());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_load_workspace_config_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".nbtelemetry.json"),
            r#"{"collectorUrl": "http://c/api", "retryDelayMs": 50}"#,
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.collector_url.as_deref(), Some("http://c/api"));
        assert_eq!(config.retry_delay_ms, Some(50));
    }

    #[test]
    fn test_load_workspace_config_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".nbtelemetry.yaml"),
            "collectorUrl: http://yaml/api\nscrollDebounceMs: 300\n",
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.collector_url.as_deref(), Some("http://yaml/api"));
        assert_eq!(config.scroll_debounce_ms, Some(300));
    }

    #[test]
    fn test_load_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".nbtelemetry.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_save_workspace_config() {
        let temp = TempDir::new().unwrap();
        let config = WorkspaceConfig {
            token: Some("secret-token".to_string()),
            ..Default::default()
        };

        let saved_path = save_workspace_config(temp.path(), &config).unwrap();
        let content = std::fs::read_to_string(&saved_path).unwrap();
        assert!(content.contains("secret-token"));
    }

    #[test]
    fn test_find_workspace_root() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("a").join("b");
        std::fs::create_dir_all(&subdir).unwrap();
        std::fs::write(temp.path().join(".nbtelemetry.json"), "{}").unwrap();

        assert_eq!(find_workspace_root(&subdir).unwrap(), temp.path());
    }

    #[test]
    fn test_init_config() {
        let temp = TempDir::new().unwrap();
        let path = init_config(temp.path(), None).unwrap();
        assert_eq!(path.file_name().unwrap(), ".nbtelemetry.json");
        let loaded = load_config_file(&path).unwrap();
        assert!(loaded.relay.is_some());
    }

    #[test]
    fn test_init_config_keeps_existing_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".nbtelemetry.json"), "{\"userId\": \"me\"}").unwrap();

        assert!(matches!(
            init_config(temp.path(), None),
            Err(ConfigError::AlreadyExists(_))
        ));
        let kept = load_config_file(&temp.path().join(".nbtelemetry.json")).unwrap();
        assert_eq!(kept.user_id.as_deref(), Some("me"));
    }
}
