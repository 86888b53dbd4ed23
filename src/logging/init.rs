// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Configuration for the log subscriber.
///
/// Logs always go to stderr so that `config show` and other commands can
/// print to stdout untouched.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when neither `RUST_LOG` nor a directive is set.
    pub default_level: Level,

    /// Log span close events with their busy/idle timings.
    pub span_timings: bool,

    /// Include file and line of each record.
    pub include_file_line: bool,

    /// Include the module path of each record.
    pub include_target: bool,

    pub ansi_colors: bool,

    /// Single-line records.
    pub compact: bool,

    /// Explicit filter directive; overrides `RUST_LOG` and `default_level`.
    pub filter_directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            span_timings: false,
            include_file_line: false,
            include_target: true,
            ansi_colors: true,
            compact: true,
            filter_directive: None,
        }
    }
}

impl LogConfig {
    /// Verbose output with span timings, for working on the pipeline.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            span_timings: true,
            include_file_line: true,
            compact: false,
            ..Self::default()
        }
    }

    /// Warnings and errors only, no colors.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            ansi_colors: false,
            ..Self::default()
        }
    }

    /// Everything from this crate.
    pub fn testing() -> Self {
        Self {
            default_level: Level::TRACE,
            span_timings: true,
            include_file_line: true,
            ansi_colors: false,
            compact: false,
            filter_directive: Some("nbtelemetry=trace".to_string()),
            ..Self::default()
        }
    }

    /// Map the CLI's `--verbose` / `--debug` flags to a preset.
    pub fn from_flags(verbose: bool, debug: bool) -> Self {
        if debug {
            Self::development()
        } else if verbose {
            Self::default().with_level(Level::DEBUG)
        } else {
            Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    /// Resolve the filter: directive, then `RUST_LOG`, then the level.
    pub fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_level.as_str().to_lowercase());
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Marker returned once the global subscriber is installed.
///
/// Keep it alive for the duration of the program.
#[derive(Debug)]
pub struct LogGuard {
    _private: (),
}

/// Install the global `tracing` subscriber.
///
/// Call once at startup; a second call fails because a global subscriber
/// is already set.
///
/// ```rust,ignore
/// use nbtelemetry::logging::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::default())?;
/// ```
pub fn init_logging(config: &LogConfig) -> io::Result<LogGuard> {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = if config.compact {
        registry.with(layer.compact()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    installed.map_err(|e| io::Error::other(e.to_string()))?;

    Ok(LogGuard { _private: () })
}
