// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for nbtelemetry.
//!
//! This module provides strongly-typed errors for the different parts of the
//! capture pipeline, using `thiserror` for ergonomic error definitions and
//! `anyhow` for error propagation in the binary.

use thiserror::Error;

/// Errors that can occur while loading configuration or resolving toggles.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Config file already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Missing settings key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors from a single delivery attempt to a sink.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Response missing field: {0}")]
    MissingField(String),

    #[error("Failed to serialize message: {0}")]
    Serialize(String),
}

impl DeliveryError {
    /// Create a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Check if retrying the same message could succeed.
    ///
    /// Serialization failures are deterministic; everything the remote side
    /// can cause is treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Serialize(_))
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors raised by the capture pipeline itself.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Notebook is closed")]
    DocumentClosed,

    #[error("Failed to serialize notebook: {0}")]
    Serialize(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

/// Errors that can occur while replaying a host script.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown cell: {0}")]
    UnknownCell(String),

    #[error("Index {index} out of range (notebook has {len} cells)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No notebook is open")]
    NotOpen,

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl From<std::io::Error> for ReplayError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Errors from the collection server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {message}")]
    BindFailed { addr: String, message: String },

    #[error("Server error: {0}")]
    Serve(String),
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
