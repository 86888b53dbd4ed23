// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sink that stores envelopes through an API-gateway relay.
//!
//! Each attempt runs the whole chain: post `{ "data": envelope }` to the
//! relay, then forward the envelope to the collector together with the
//! relay's response and the storage path it reported.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::{CollectorSink, Sink, RELAY_SINK_URN};
use crate::config::RelayConfig;
use crate::envelope::EventEnvelope;
use crate::error::DeliveryError;

#[derive(Debug, Clone)]
pub struct RelaySink {
    client: Client,
    endpoint: String,
    collector: CollectorSink,
}

impl RelaySink {
    pub fn new(client: Client, relay: &RelayConfig, collector: CollectorSink) -> Self {
        let endpoint = [
            relay.url.trim_end_matches('/'),
            relay.bucket.as_str(),
            relay.path.as_str(),
        ]
        .join("/");
        Self {
            client,
            endpoint,
            collector,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn store(&self, envelope: &EventEnvelope) -> Result<Value, DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&json!({ "data": envelope }))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| DeliveryError::Parse(e.to_string()))
    }

    /// The envelope plus `aws_response` and the stored object's `path`.
    fn enrich(&self, envelope: &EventEnvelope, relay_response: Value) -> Result<Value, DeliveryError> {
        let context = relay_response
            .get("context")
            .ok_or_else(|| DeliveryError::MissingField("context".to_string()))?;
        let epoch = context_field(context, "request-time-epoch")?;
        let request_id = context_field(context, "request-id")?;
        let path = format!("{}/{}/{}", self.endpoint, epoch, request_id);

        let mut message =
            serde_json::to_value(envelope).map_err(|e| DeliveryError::Serialize(e.to_string()))?;
        let fields = message
            .as_object_mut()
            .ok_or_else(|| DeliveryError::Serialize("envelope is not an object".to_string()))?;
        fields.insert("aws_response".to_string(), relay_response);
        fields.insert("path".to_string(), Value::String(path));
        Ok(message)
    }
}

/// Render a context value the way it appears in the stored path.
fn context_field(context: &Value, key: &str) -> Result<String, DeliveryError> {
    match context.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(DeliveryError::MissingField(format!("context.{key}"))),
        Some(other) => Ok(other.to_string()),
    }
}

#[async_trait]
impl Sink for RelaySink {
    fn name(&self) -> &str {
        "relay"
    }

    fn urn(&self) -> &str {
        RELAY_SINK_URN
    }

    async fn send(&self, envelope: &EventEnvelope) -> Result<Value, DeliveryError> {
        let relay_response = self.store(envelope).await?;
        let message = self.enrich(envelope, relay_response)?;
        debug!(
            path = message["path"].as_str().unwrap_or_default(),
            "relay stored message; forwarding to collector"
        );
        self.collector.post(&message).await
    }
}
