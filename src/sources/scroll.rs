// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Debounced viewport scroll events.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{SourceContext, SubscriptionSlot};
use crate::dispatcher::Emitter;
use crate::envelope::{CellMeta, EventName};
use crate::notebook::{lock, Notebook};
use crate::toggle::Toggle;

/// Emits `scroll` with every visible cell once scrolling has been quiet for
/// the debounce window.
///
/// Each scroll signal cancels the pending evaluation and schedules a new one.
/// Visibility is computed when the evaluation runs.
pub struct ScrollSource {
    me: Weak<ScrollSource>,
    notebook: Weak<Notebook>,
    emitter: Arc<Emitter>,
    runtime: Handle,
    cancel: CancellationToken,
    debounce: Duration,
    slot: SubscriptionSlot,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ScrollSource {
    pub const URN: &'static str = "mentoracademy.org/schemas/events/1.0.0/ScrollEvent";

    pub fn new(ctx: &SourceContext) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            notebook: Arc::downgrade(&ctx.notebook),
            emitter: Arc::clone(&ctx.emitter),
            runtime: ctx.runtime.clone(),
            cancel: ctx.cancel.clone(),
            debounce: ctx.scroll_debounce,
            slot: SubscriptionSlot::default(),
            pending: Mutex::new(None),
        })
    }

    fn schedule(&self) {
        let weak = self.me.clone();
        let cancel = self.cancel.clone();
        let debounce = self.debounce;

        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        trace!(debounce_ms = debounce.as_millis() as u64, "scroll evaluation scheduled");
        *pending = Some(self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(debounce) => {
                    if let Some(source) = weak.upgrade() {
                        source.evaluate();
                    }
                }
            }
        }));
    }

    fn evaluate(&self) {
        if let Some(notebook) = self.notebook.upgrade() {
            self.emitter.emit(EventName::Scroll, visible_cells(&notebook));
        }
    }

    fn cancel_pending(&self) {
        if let Some(pending) = lock(&self.pending).take() {
            pending.abort();
        }
    }
}

impl Toggle for ScrollSource {
    fn enable(&self) {
        let Some(notebook) = self.notebook.upgrade() else {
            return;
        };
        let weak = self.me.clone();
        self.slot.hold(notebook.scrolled.connect(move |_| {
            if let Some(source) = weak.upgrade() {
                source.schedule();
            }
        }));
    }

    fn disable(&self) {
        self.slot.release();
        self.cancel_pending();
    }
}

/// Cells whose extent intersects the viewport, in document order.
pub fn visible_cells(notebook: &Notebook) -> Vec<CellMeta> {
    let view = notebook.viewport();
    let (view_top, view_bottom) = (view.scroll_top, view.bottom());

    notebook
        .cells()
        .iter()
        .enumerate()
        .filter(|(_, cell)| {
            let extent = cell.extent();
            !(extent.top > view_bottom || extent.bottom() < view_top)
        })
        .map(|(index, cell)| CellMeta::new(cell.id(), index))
        .collect()
}
