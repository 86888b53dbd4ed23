// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! nbtelemetry - notebook activity capture and delivery.
//!
//! Observes notebook documents, turns user actions into sequenced event
//! envelopes carrying deduplicated snapshots, and delivers each envelope to
//! every enabled sink with unbounded retry.
//!
//! # Architecture
//!
//! - [`notebook`] - Host document model (cells, viewport, signals)
//! - [`toggle`] - Settings-driven enable/disable supervision
//! - [`tracker`] - Per-document snapshots with change fingerprints
//! - [`sources`] - One event source per kind of user action
//! - [`envelope`] - Event envelope assembly
//! - [`sinks`] - Delivery destinations and the retry loop
//! - [`dispatcher`] - Per-document wiring of tracker, sources and sinks
//! - [`extension`] - Application-wide activation
//! - [`server`] - HTTP collection endpoint
//! - [`replay`] - Scripted host driver
//! - [`config`], [`logging`], [`error`] - Ambient plumbing
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nbtelemetry::config::{load_config, CliOptions, Settings};
//! use nbtelemetry::notebook::{Cell, Host, Notebook};
//! use nbtelemetry::TelemetryExtension;
//!
//! let config = load_config(".", CliOptions::default())?;
//! let settings = Arc::new(Settings::from_config(&config));
//! let extension = TelemetryExtension::activate(&config, settings, Arc::new(Host::new()))?;
//!
//! let notebook = Arc::new(Notebook::new("lab1.ipynb", vec![Cell::code("c1", "1 + 1")]));
//! extension.track(&notebook)?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod extension;
pub mod logging;
pub mod notebook;
pub mod replay;
pub mod server;
pub mod sinks;
pub mod sources;
pub mod toggle;
pub mod tracker;

// Re-export commonly used types at crate root
pub use config::{load_config, CliOptions, ResolvedConfig, Settings};
pub use dispatcher::{Dispatcher, DispatcherOptions, Emitter};
pub use envelope::{CellMeta, EventEnvelope, EventName};
pub use error::{ConfigError, DeliveryError, ReplayError, Result, ServerError, TelemetryError};
pub use extension::TelemetryExtension;
pub use notebook::{Cell, CellKind, Host, Notebook};
pub use sinks::{CollectorSink, DeliveryOutcome, RelaySink, Sink, ToggledSink};
pub use toggle::{Toggle, ToggleSupervisor};
pub use tracker::StateTracker;

/// nbtelemetry version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let notebook = std::sync::Arc::new(Notebook::new("n.ipynb", vec![Cell::code("c1", "")]));
        assert_eq!(notebook.len(), 1);
        assert_eq!(EventName::OpenNotebook.as_str(), "open_notebook");
    }
}
