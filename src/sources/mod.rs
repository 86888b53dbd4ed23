// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Event sources.
//!
//! Each source listens to one host signal while enabled, picks the cells the
//! event is about and hands them to the document's [`Emitter`]. Sources are
//! built from [`SOURCE_REGISTRY`] and switched by a
//! [`ToggleSupervisor`](crate::toggle::ToggleSupervisor) each.

mod cells;
mod lifecycle;
mod scroll;

pub use cells::{ActiveCellChangedSource, AddCellSource, CellExecutedSource, RemoveCellSource};
pub use lifecycle::{OpenNotebookSource, SaveNotebookSource};
pub use scroll::{visible_cells, ScrollSource};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Emitter;
use crate::envelope::EventName;
use crate::notebook::{lock, Host, Notebook, Subscription};
use crate::toggle::Toggle;

/// Everything a source needs from its document.
#[derive(Clone)]
pub struct SourceContext {
    pub notebook: Arc<Notebook>,
    pub host: Arc<Host>,
    pub emitter: Arc<Emitter>,
    pub runtime: Handle,
    /// Cancelled when the document is torn down.
    pub cancel: CancellationToken,
    pub scroll_debounce: Duration,
}

/// One entry of the source registry.
#[derive(Clone, Copy)]
pub struct SourceRegistration {
    /// Settings URN under the `"event"` key.
    pub urn: &'static str,
    pub event_name: EventName,
    pub build: fn(&SourceContext) -> Arc<dyn Toggle>,
}

/// Every event source, in the order they are attached to a document.
pub const SOURCE_REGISTRY: &[SourceRegistration] = &[
    SourceRegistration {
        urn: SaveNotebookSource::URN,
        event_name: EventName::SaveNotebook,
        build: |ctx| Arc::new(SaveNotebookSource::new(ctx)),
    },
    SourceRegistration {
        urn: CellExecutedSource::URN,
        event_name: EventName::CellExecuted,
        build: |ctx| Arc::new(CellExecutedSource::new(ctx)),
    },
    SourceRegistration {
        urn: ActiveCellChangedSource::URN,
        event_name: EventName::ActiveCellChanged,
        build: |ctx| Arc::new(ActiveCellChangedSource::new(ctx)),
    },
    SourceRegistration {
        urn: ScrollSource::URN,
        event_name: EventName::Scroll,
        build: |ctx| ScrollSource::new(ctx),
    },
    SourceRegistration {
        urn: AddCellSource::URN,
        event_name: EventName::AddCell,
        build: |ctx| Arc::new(AddCellSource::new(ctx)),
    },
    SourceRegistration {
        urn: RemoveCellSource::URN,
        event_name: EventName::RemoveCell,
        build: |ctx| Arc::new(RemoveCellSource::new(ctx)),
    },
    SourceRegistration {
        urn: OpenNotebookSource::URN,
        event_name: EventName::OpenNotebook,
        build: |ctx| Arc::new(OpenNotebookSource::new(ctx)),
    },
];

/// Look up a registration by URN.
pub fn registration(urn: &str) -> Option<&'static SourceRegistration> {
    SOURCE_REGISTRY.iter().find(|registration| registration.urn == urn)
}

/// Holds a source's signal connection while it is enabled.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionSlot(Mutex<Option<Subscription>>);

impl SubscriptionSlot {
    pub(crate) fn hold(&self, subscription: Subscription) {
        let previous = lock(&self.0).replace(subscription);
        drop(previous);
    }

    pub(crate) fn release(&self) {
        let current = lock(&self.0).take();
        if let Some(subscription) = current {
            subscription.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_urns_are_unique_and_namespaced() {
        let urns: HashSet<_> = SOURCE_REGISTRY.iter().map(|r| r.urn).collect();
        assert_eq!(urns.len(), SOURCE_REGISTRY.len());
        for registration in SOURCE_REGISTRY {
            assert!(registration
                .urn
                .starts_with("mentoracademy.org/schemas/events/1.0.0/"));
        }
    }

    #[test]
    fn test_every_emitted_event_has_a_source() {
        for name in EventName::ALL {
            let registered = SOURCE_REGISTRY.iter().any(|r| r.event_name == name);
            assert_eq!(registered, name != EventName::ExecuteCell, "{name}");
        }
    }

    #[test]
    fn test_subscription_slot_replaces_and_releases() {
        let signal = crate::notebook::Signal::<()>::new("test.signal");
        let slot = SubscriptionSlot::default();

        slot.hold(signal.connect(|_| {}));
        slot.hold(signal.connect(|_| {}));
        assert_eq!(signal.handler_count(), 1);

        slot.release();
        assert_eq!(signal.handler_count(), 0);
        slot.release();
    }

    #[test]
    fn test_registration_lookup() {
        assert_eq!(
            registration(ScrollSource::URN).map(|r| r.event_name),
            Some(EventName::Scroll)
        );
        assert!(registration("urn:unknown").is_none());
    }
}
