// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Delivery of assembled envelopes.
//!
//! A [`Sink`] makes one transmission attempt. [`deliver`] wraps it in the
//! delivery contract: skip when disabled, retry the same envelope after a
//! fixed delay until it succeeds, give up only when the document closes.
//! [`fanout`] runs one independent delivery task per sink.

mod collector;
mod relay;

pub use collector::CollectorSink;
pub use relay::RelaySink;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::envelope::EventEnvelope;
use crate::error::DeliveryError;
use crate::logging::GLOBAL_METRICS;
use crate::toggle::Toggle;

/// Settings URN of the collector sink.
pub const COLLECTOR_SINK_URN: &str = "mentoracademy.org/handlers/CollectorHandler";

/// Settings URN of the relay sink.
pub const RELAY_SINK_URN: &str = "mentoracademy.org/handlers/AWSAPIGatewayHandler";

/// A remote endpoint envelopes are sent to.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &str;

    /// Settings URN under the `"handler"` key.
    fn urn(&self) -> &str;

    /// Make one transmission attempt and return the endpoint's response.
    async fn send(&self, envelope: &EventEnvelope) -> Result<Value, DeliveryError>;
}

/// How a delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint accepted the envelope after `attempts` tries.
    Delivered { attempts: u32 },
    /// The sink was disabled when an attempt was due.
    Skipped,
    /// The document closed while a retry was pending.
    Abandoned { attempts: u32 },
    /// The envelope can never be sent by this sink.
    Failed { attempts: u32, error: String },
}

/// A sink together with its runtime enabled bit.
pub struct ToggledSink {
    sink: Arc<dyn Sink>,
    enabled: AtomicBool,
}

impl ToggledSink {
    /// Wrap `sink`; it starts disabled until its supervisor resolves it.
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.sink.name()
    }

    pub fn urn(&self) -> &str {
        self.sink.urn()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn send(&self, envelope: &EventEnvelope) -> Result<Value, DeliveryError> {
        self.sink.send(envelope).await
    }
}

impl Toggle for ToggledSink {
    fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for ToggledSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToggledSink")
            .field("name", &self.name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Deliver `envelope` through `sink`, retrying until it succeeds.
///
/// The enabled bit is checked before every attempt. An attempt in flight is
/// never interrupted; `cancel` only stops the retry that would follow it.
#[instrument(
    skip_all,
    fields(sink = %sink.name(), event = %envelope.event_name, seq = envelope.seq())
)]
pub async fn deliver(
    sink: &ToggledSink,
    envelope: &EventEnvelope,
    retry_delay: Duration,
    cancel: &CancellationToken,
) -> DeliveryOutcome {
    let mut attempts = 0u32;

    loop {
        if !sink.is_enabled() {
            debug!("sink disabled; skipping");
            GLOBAL_METRICS.record_skipped(sink.name());
            return DeliveryOutcome::Skipped;
        }

        attempts += 1;
        let start = Instant::now();
        let result = sink.send(envelope).await;
        GLOBAL_METRICS.record_attempt(sink.name(), start.elapsed(), result.is_ok());

        match result {
            Ok(_) => {
                debug!(attempts, "delivered");
                return DeliveryOutcome::Delivered { attempts };
            }
            Err(err) if !err.is_retryable() => {
                error!(attempt = attempts, error = %err, "delivery failed permanently");
                return DeliveryOutcome::Failed {
                    attempts,
                    error: err.to_string(),
                };
            }
            Err(err) => {
                warn!(
                    attempt = attempts,
                    error = %err,
                    "delivery failed; retrying in {}ms",
                    retry_delay.as_millis()
                );
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempts, "document closed; abandoning delivery");
                GLOBAL_METRICS.record_abandoned(sink.name());
                return DeliveryOutcome::Abandoned { attempts };
            }
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

/// Start one delivery task per sink for the same envelope.
pub fn fanout(
    runtime: &Handle,
    sinks: &[Arc<ToggledSink>],
    envelope: Arc<EventEnvelope>,
    retry_delay: Duration,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<DeliveryOutcome>> {
    sinks
        .iter()
        .map(|sink| {
            let sink = Arc::clone(sink);
            let envelope = Arc::clone(&envelope);
            let cancel = cancel.clone();
            runtime.spawn(async move { deliver(&sink, &envelope, retry_delay, &cancel).await })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sinks for pipeline tests.

    use super::*;
    use crate::notebook::lock;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every attempt; fails while scripted failures remain.
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<EventEnvelope>>,
        failures: Mutex<VecDeque<DeliveryError>>,
    }

    impl RecordingSink {
        pub fn failing(failures: impl IntoIterator<Item = DeliveryError>) -> Self {
            Self {
                sent: Mutex::default(),
                failures: Mutex::new(failures.into_iter().collect()),
            }
        }

        pub fn sent(&self) -> Vec<EventEnvelope> {
            lock(&self.sent).clone()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn urn(&self) -> &str {
            COLLECTOR_SINK_URN
        }

        async fn send(&self, envelope: &EventEnvelope) -> Result<Value, DeliveryError> {
            lock(&self.sent).push(envelope.clone());
            match lock(&self.failures).pop_front() {
                Some(err) => Err(err),
                None => Ok(serde_json::json!({"ok": true})),
            }
        }
    }
}
