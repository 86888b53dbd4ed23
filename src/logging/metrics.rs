// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline counters.
//!
//! Delivery failures are invisible to the user, so these counters (and the
//! logs) are the only way to notice a collector outage from the client side.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::envelope::EventName;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// Envelopes emitted, by event name.
    events: RwLock<HashMap<EventName, u64>>,

    /// Delivery counters, by sink name.
    sinks: RwLock<HashMap<String, SinkMetrics>>,

    /// Start time for calculating uptime.
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            sinks: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Count an emitted envelope.
    pub fn record_event(&self, name: EventName) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        *events.entry(name).or_insert(0) += 1;
    }

    /// Record one delivery attempt and how long it took.
    pub fn record_attempt(&self, sink: &str, duration: Duration, success: bool) {
        self.with_sink(sink, |metrics| metrics.record_attempt(duration, success));
    }

    /// Count a delivery skipped because the sink was disabled.
    pub fn record_skipped(&self, sink: &str) {
        self.with_sink(sink, |metrics| metrics.skipped += 1);
    }

    /// Count a delivery abandoned on document teardown.
    pub fn record_abandoned(&self, sink: &str) {
        self.with_sink(sink, |metrics| metrics.abandoned += 1);
    }

    fn with_sink(&self, sink: &str, update: impl FnOnce(&mut SinkMetrics)) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        update(sinks.entry(sink.to_string()).or_default());
    }

    /// Envelopes emitted for one event name.
    pub fn event_count(&self, name: EventName) -> u64 {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .copied()
            .unwrap_or(0)
    }

    /// Counters for one sink.
    pub fn sink_metrics(&self, sink: &str) -> Option<SinkMetrics> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sink)
            .cloned()
    }

    /// Get uptime since metrics were initialized.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events: self
                .events
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            sinks: self
                .sinks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery counters for one sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkMetrics {
    /// Attempts made, including retries.
    pub attempts: u64,

    /// Attempts that succeeded.
    pub delivered: u64,

    /// Attempts that failed and were rescheduled.
    pub failures: u64,

    /// Deliveries dropped because the sink was disabled.
    pub skipped: u64,

    /// Deliveries abandoned because their document closed.
    pub abandoned: u64,

    /// Total time spent in attempts.
    pub total_duration: Duration,

    /// Slowest single attempt.
    pub max_duration: Duration,
}

impl SinkMetrics {
    fn record_attempt(&mut self, duration: Duration, success: bool) {
        self.attempts += 1;
        if success {
            self.delivered += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    /// Average attempt latency.
    pub fn avg_duration(&self) -> Duration {
        if self.attempts == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.attempts as u32
        }
    }

    /// Fraction of attempts that succeeded (1.0 when idle).
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.delivered as f64 / self.attempts as f64
        }
    }
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub events: HashMap<EventName, u64>,
    pub sinks: HashMap<String, SinkMetrics>,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Total envelopes emitted.
    pub fn total_events(&self) -> u64 {
        self.events.values().sum()
    }
}
