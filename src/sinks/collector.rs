// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sink posting envelopes to the collection endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use super::{Sink, COLLECTOR_SINK_URN};
use crate::envelope::EventEnvelope;
use crate::error::DeliveryError;

/// Posts each envelope as JSON to `<base>/event`.
#[derive(Debug, Clone)]
pub struct CollectorSink {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl CollectorSink {
    /// Create a sink for the collector mounted at `base_url`.
    ///
    /// `token` is sent as `Authorization: token <token>` when present.
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/event", base_url.trim_end_matches('/')),
            token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST any JSON body to the collector and parse the response.
    ///
    /// Only a 200 counts as success.
    pub async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<Value, DeliveryError> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");

        if let Some(ref token) = self.token {
            req = req.header("authorization", format!("token {}", token));
        }

        let response = req.json(body).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::status(status.as_u16(), body));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| DeliveryError::Parse(e.to_string()))?;
        trace!(endpoint = %self.endpoint, response = %parsed, "collector accepted message");
        Ok(parsed)
    }
}

#[async_trait]
impl Sink for CollectorSink {
    fn name(&self) -> &str {
        "collector"
    }

    fn urn(&self) -> &str {
        COLLECTOR_SINK_URN
    }

    async fn send(&self, envelope: &EventEnvelope) -> Result<Value, DeliveryError> {
        self.post(envelope).await
    }
}
