// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime enable/disable of capture units.
//!
//! Every event source and every sink implements [`Toggle`]. A
//! [`ToggleSupervisor`] owns the enabled bit for one unit, resolves it from
//! [`Settings`] and calls `enable()`/`disable()` only on transitions.
//! Resolution failures fail closed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::config::Settings;
use crate::notebook::{lock, Subscription};

/// A unit that can be switched on and off at runtime.
///
/// The supervisor guarantees alternating calls; implementations need not
/// guard against `enable()` twice in a row.
pub trait Toggle: Send + Sync {
    fn enable(&self);
    fn disable(&self);

    /// Runs once, in the initial resolution task, right after the unit's
    /// state has been resolved for the first time.
    fn started(&self) {}
}

/// Keeps one unit's enabled state in line with the settings document.
pub struct ToggleSupervisor {
    key: String,
    urn: String,
    unit: Arc<dyn Toggle>,
    settings: Weak<Settings>,
    enabled: Mutex<bool>,
    detached: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
    /// Flips to true once the initial resolution task has finished.
    initialized: watch::Sender<bool>,
}

impl ToggleSupervisor {
    /// Supervise `unit` under `settings.get(key).composite[urn]`.
    ///
    /// Subscribes to settings changes right away and schedules the initial
    /// resolution on `runtime`, so the unit starts disabled.
    pub fn attach(
        settings: &Arc<Settings>,
        key: impl Into<String>,
        urn: impl Into<String>,
        unit: Arc<dyn Toggle>,
        runtime: &Handle,
    ) -> Arc<Self> {
        let supervisor = Arc::new(Self {
            key: key.into(),
            urn: urn.into(),
            unit,
            settings: Arc::downgrade(settings),
            enabled: Mutex::new(false),
            detached: AtomicBool::new(false),
            subscription: Mutex::new(None),
            initialized: watch::Sender::new(false),
        });

        let weak = Arc::downgrade(&supervisor);
        let subscription = settings.changed.connect(move |_| {
            if let Some(supervisor) = weak.upgrade() {
                supervisor.resolve();
            }
        });
        *lock(&supervisor.subscription) = Some(subscription);

        let weak = Arc::downgrade(&supervisor);
        runtime.spawn(async move {
            let Some(supervisor) = weak.upgrade() else {
                return;
            };
            if !supervisor.is_detached() {
                supervisor.resolve();
                supervisor.unit.started();
            }
            supervisor.initialized.send_replace(true);
        });

        supervisor
    }

    /// Read the settings and apply any transition.
    pub fn resolve(&self) {
        let mut enabled = lock(&self.enabled);
        if self.is_detached() {
            return;
        }

        let resolved = match self.settings.upgrade() {
            Some(settings) => settings.is_enabled(&self.key, &self.urn),
            None => {
                debug!(urn = %self.urn, "settings dropped; leaving unit as is");
                return;
            }
        };

        match resolved {
            Ok(true) if !*enabled => {
                debug!(urn = %self.urn, "enabling");
                self.unit.enable();
                *enabled = true;
            }
            Ok(false) if *enabled => {
                debug!(urn = %self.urn, "disabling");
                self.unit.disable();
                *enabled = false;
            }
            Ok(_) => {}
            Err(err) => {
                error!(urn = %self.urn, key = %self.key, error = %err, "failed to resolve toggle; disabling");
                if *enabled {
                    self.unit.disable();
                }
                *enabled = false;
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        *lock(&self.enabled)
    }

    /// Wait for the initial resolution, including the unit's `started()`
    /// hook, to finish.
    pub async fn ready(&self) {
        let mut initialized = self.initialized.subscribe();
        let _ = initialized.wait_for(|done| *done).await;
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    /// Stop following settings and disable the unit.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.disconnect();
        }
        let mut enabled = lock(&self.enabled);
        if *enabled {
            self.unit.disable();
            *enabled = false;
        }
    }
}

impl fmt::Debug for ToggleSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToggleSupervisor")
            .field("key", &self.key)
            .field("urn", &self.urn)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
