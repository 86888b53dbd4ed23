// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and pipeline metrics.
//!
//! Every component logs through `tracing`:
//!
//! - `debug!` for per-event flow (source fired, snapshot taken),
//! - `info!` for lifecycle (document tracked, server listening),
//! - `warn!` for failed delivery attempts,
//! - `error!` for configuration failures and panicking signal handlers.
//!
//! Initialize once at startup:
//!
//! ```rust,ignore
//! use nbtelemetry::logging::{init_logging, LogConfig};
//!
//! let _guard = init_logging(&LogConfig::from_flags(verbose, debug))?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_logging, LogConfig, LogGuard};
pub use metrics::{Metrics, MetricsSnapshot, SinkMetrics, GLOBAL_METRICS};
