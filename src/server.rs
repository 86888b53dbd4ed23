// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Collection endpoint.
//!
//! Receives envelopes on `POST <base>/nbtelemetry/event`, attaches the
//! configured metadata and hands both to an [`EventSink`].

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ResolvedServerConfig;
use crate::error::ServerError;

/// Route of the event endpoint below the base URL.
pub const EVENT_ROUTE: &str = "nbtelemetry/event";

/// Server-side destination of received events.
pub trait EventSink: Send + Sync {
    fn handle_event(&self, event: &Value, metadata: &Map<String, Value>);
}

/// Writes every event to the log at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn handle_event(&self, event: &Value, metadata: &Map<String, Value>) {
        let event_name = event.get("event_name").and_then(|v| v.as_str()).unwrap_or("?");
        let seq = event.get("seq").and_then(|v| v.as_u64());
        let user_id = event.get("user_id").and_then(|v| v.as_str()).unwrap_or_default();
        let metadata = serde_json::Value::Object(metadata.clone());
        info!(
            event_name,
            seq,
            user_id,
            event = %event,
            metadata = %metadata,
            "got telemetry event"
        );
    }
}

#[derive(Clone)]
pub struct ServerState {
    sink: Arc<dyn EventSink>,
    metadata: Arc<Map<String, Value>>,
    token: Option<Arc<str>>,
}

impl ServerState {
    pub fn new(sink: Arc<dyn EventSink>, metadata: Map<String, Value>) -> Self {
        Self {
            sink,
            metadata: Arc::new(metadata),
            token: None,
        }
    }

    /// Require `Authorization: token <token>` on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Arc::from(token.into()));
        self
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(ref token) = self.token else {
            return true;
        };
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("token "))
            .is_some_and(|presented| presented == token.as_ref())
    }
}

#[derive(Debug)]
enum ApiError {
    Unauthorized,
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(json!({ "ok": false, "message": message }))).into_response()
    }
}

/// Full path of the event endpoint under `base_url`.
pub fn event_path(base_url: &str) -> String {
    let base = base_url.trim_matches('/');
    if base.is_empty() {
        format!("/{EVENT_ROUTE}")
    } else {
        format!("/{base}/{EVENT_ROUTE}")
    }
}

pub fn router(state: ServerState, base_url: &str) -> Router {
    Router::new()
        .route(&event_path(base_url), post(post_event))
        .with_state(state)
}

async fn post_event(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if !state.authorized(&headers) {
        warn!("rejected event with bad token");
        return Err(ApiError::Unauthorized);
    }
    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
    debug!(bytes = body.len(), "received event");

    state.sink.handle_event(&event, &state.metadata);
    Ok(Json(json!({ "ok": true })))
}

/// Bind the listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::BindFailed {
            addr: addr.to_string(),
            message: e.to_string(),
        })
}

/// Serve `app` on `listener` until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("collection server listening on http://{}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}

/// Bind and serve with the resolved server configuration.
pub async fn run(
    config: &ResolvedServerConfig,
    state: ServerState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = bind(&config.bind).await?;
    serve(listener, router(state, &config.base_url), shutdown).await
}
