// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application-wide activation.
//!
//! [`TelemetryExtension`] is created once per application. It owns the
//! sinks and their supervisors, and starts a [`Dispatcher`] for every
//! notebook handed to [`track`](TelemetryExtension::track).

use std::sync::{Arc, Mutex};

use reqwest::Client;
use tokio::runtime::Handle;
use tracing::info;

use crate::config::{ResolvedConfig, Settings, HANDLER_SETTINGS_KEY};
use crate::dispatcher::{Dispatcher, DispatcherOptions};
use crate::error::TelemetryError;
use crate::notebook::{lock, Host, Notebook};
use crate::sinks::{CollectorSink, RelaySink, Sink, ToggledSink};
use crate::toggle::{Toggle, ToggleSupervisor};

pub struct TelemetryExtension {
    host: Arc<Host>,
    settings: Arc<Settings>,
    sinks: Vec<Arc<ToggledSink>>,
    supervisors: Vec<Arc<ToggleSupervisor>>,
    user_id: String,
    options: DispatcherOptions,
    dispatchers: Mutex<Vec<Arc<Dispatcher>>>,
}

impl TelemetryExtension {
    /// Build the sinks described by `config` and start following `settings`.
    pub fn activate(
        config: &ResolvedConfig,
        settings: Arc<Settings>,
        host: Arc<Host>,
    ) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TelemetryError::HttpClient(e.to_string()))?;

        let collector = CollectorSink::new(client.clone(), &config.collector_url, config.token.clone());
        let mut sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(collector.clone())];
        if let Some(ref relay) = config.relay {
            sinks.push(Arc::new(RelaySink::new(client, relay, collector)));
        }

        Self::with_sinks(config, settings, host, sinks)
    }

    /// Activate with caller-provided sinks.
    pub fn with_sinks(
        config: &ResolvedConfig,
        settings: Arc<Settings>,
        host: Arc<Host>,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> Result<Self, TelemetryError> {
        let runtime = Handle::try_current().map_err(|e| TelemetryError::NoRuntime(e.to_string()))?;

        let sinks: Vec<Arc<ToggledSink>> = sinks
            .into_iter()
            .map(|sink| Arc::new(ToggledSink::new(sink)))
            .collect();
        let supervisors = sinks
            .iter()
            .map(|sink| {
                ToggleSupervisor::attach(
                    &settings,
                    HANDLER_SETTINGS_KEY,
                    sink.urn().to_string(),
                    Arc::clone(sink) as Arc<dyn Toggle>,
                    &runtime,
                )
            })
            .collect();

        let user_id = config.effective_user_id();
        info!(
            sinks = ?sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "telemetry activated"
        );

        Ok(Self {
            host,
            settings,
            sinks,
            supervisors,
            user_id,
            options: DispatcherOptions {
                scroll_debounce: config.scroll_debounce(),
                retry_delay: config.retry_delay(),
            },
            dispatchers: Mutex::new(Vec::new()),
        })
    }

    /// Start capturing `notebook`.
    pub fn track(&self, notebook: &Arc<Notebook>) -> Result<Arc<Dispatcher>, TelemetryError> {
        let dispatcher = Dispatcher::open(
            notebook,
            &self.host,
            &self.settings,
            self.sinks.clone(),
            self.user_id.clone(),
            self.options,
        )?;

        let mut dispatchers = lock(&self.dispatchers);
        dispatchers.retain(|d| !d.is_closed());
        dispatchers.push(Arc::clone(&dispatcher));
        Ok(dispatcher)
    }

    /// Wait until every sink has been resolved for the first time.
    pub async fn ready(&self) {
        for supervisor in &self.supervisors {
            supervisor.ready().await;
        }
    }

    /// Number of notebooks currently captured.
    pub fn tracked(&self) -> usize {
        let mut dispatchers = lock(&self.dispatchers);
        dispatchers.retain(|d| !d.is_closed());
        dispatchers.len()
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn sinks(&self) -> &[Arc<ToggledSink>] {
        &self.sinks
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Close every dispatcher and stop following settings.
    pub fn shutdown(&self) {
        let dispatchers = std::mem::take(&mut *lock(&self.dispatchers));
        for dispatcher in dispatchers {
            dispatcher.close();
        }
        for supervisor in &self.supervisors {
            supervisor.detach();
        }
    }
}

impl Drop for TelemetryExtension {
    fn drop(&mut self) {
        self.shutdown();
    }
}
