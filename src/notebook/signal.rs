// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Observer signals with explicit subscription tokens.
//!
//! A [`Signal`] fans one notification out to every connected handler.
//! [`Signal::connect`] hands back a [`Subscription`]; the subscriber owns it
//! and releases it with [`Subscription::disconnect`] (or by dropping it).

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::error;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// A broadcast point that host code emits and capture units connect to.
pub struct Signal<T> {
    name: &'static str,
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: 'static> Signal<T> {
    /// Create a signal. The name only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Connect a handler.
    pub fn connect(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut slots = lock(&self.slots);
            let id = slots.next_id;
            slots.next_id += 1;
            slots.handlers.push((id, Arc::new(handler)));
            id
        };

        let slots: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    lock(&slots).handlers.retain(|(slot_id, _)| *slot_id != id);
                }
            })),
        }
    }

    /// Invoke every connected handler.
    ///
    /// The handler list is copied before the first call, so handlers may
    /// connect or disconnect while the signal is being emitted. A panicking
    /// handler is logged and does not reach the emitter or the remaining
    /// handlers.
    pub fn emit(&self, args: &T) {
        let handlers: Vec<Handler<T>> = lock(&self.slots)
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(args)));
            if outcome.is_err() {
                error!(signal = self.name, "signal handler panicked");
            }
        }
    }

    /// Number of connected handlers.
    pub fn handler_count(&self) -> usize {
        lock(&self.slots).handlers.len()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("name", &self.name).finish()
    }
}

/// Handle to one connected handler.
///
/// Dropping the token disconnects the handler.
#[must_use = "dropping a Subscription disconnects the handler"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Disconnect the handler now.
    pub fn disconnect(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("connected", &self.release.is_some())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_every_handler() {
        let signal: Signal<u32> = Signal::new("test");
        let total = Arc::new(AtomicUsize::new(0));

        let a = {
            let total = Arc::clone(&total);
            signal.connect(move |n| {
                total.fetch_add(*n as usize, Ordering::SeqCst);
            })
        };
        let b = {
            let total = Arc::clone(&total);
            signal.connect(move |n| {
                total.fetch_add(*n as usize * 10, Ordering::SeqCst);
            })
        };

        signal.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 22);
        drop((a, b));
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let signal: Signal<()> = Signal::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let sub = {
            let hits = Arc::clone(&hits);
            signal.connect(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        signal.emit(&());
        sub.disconnect();
        signal.emit(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn test_drop_disconnects() {
        let signal: Signal<()> = Signal::new("test");
        {
            let _sub = signal.connect(|_| {});
            assert_eq!(signal.handler_count(), 1);
        }
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let signal: Signal<()> = Signal::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let _bad = signal.connect(|_| panic!("boom"));
        let _good = {
            let hits = Arc::clone(&hits);
            signal.connect(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        signal.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_outlives_signal() {
        let signal: Signal<()> = Signal::new("test");
        let sub = signal.connect(|_| {});
        drop(signal);
        sub.disconnect();
    }
}
