// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Document-level events: opened and saved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;

use super::{SourceContext, SubscriptionSlot};
use crate::dispatcher::Emitter;
use crate::envelope::{CellMeta, EventName};
use crate::notebook::{Notebook, SaveState};
use crate::toggle::Toggle;

/// Emits `save_notebook` with the selected and active cells whenever a save
/// completes.
pub struct SaveNotebookSource {
    notebook: Weak<Notebook>,
    emitter: Arc<Emitter>,
    slot: SubscriptionSlot,
}

impl SaveNotebookSource {
    pub const URN: &'static str = "mentoracademy.org/schemas/events/1.0.0/SaveNotebookEvent";

    pub fn new(ctx: &SourceContext) -> Self {
        Self {
            notebook: Arc::downgrade(&ctx.notebook),
            emitter: Arc::clone(&ctx.emitter),
            slot: SubscriptionSlot::default(),
        }
    }
}

impl Toggle for SaveNotebookSource {
    fn enable(&self) {
        let Some(notebook) = self.notebook.upgrade() else {
            return;
        };
        let weak = self.notebook.clone();
        let emitter = Arc::clone(&self.emitter);
        self.slot
            .hold(notebook.save_state_changed.connect(move |state| {
                if *state != SaveState::Completed {
                    return;
                }
                if let Some(notebook) = weak.upgrade() {
                    emitter.emit(EventName::SaveNotebook, selected_cells(&notebook));
                }
            }));
    }

    fn disable(&self) {
        self.slot.release();
    }
}

/// Cells that are selected or active, in document order.
pub(crate) fn selected_cells(notebook: &Notebook) -> Vec<CellMeta> {
    notebook
        .cells()
        .iter()
        .enumerate()
        .filter(|(_, cell)| notebook.is_selected_or_active(cell.key()))
        .map(|(index, cell)| CellMeta::new(cell.id(), index))
        .collect()
}

/// Emits `open_notebook` with every cell, once, after the initial toggle
/// resolution, and only if the source is enabled by then.
pub struct OpenNotebookSource {
    notebook: Weak<Notebook>,
    emitter: Arc<Emitter>,
    enabled: AtomicBool,
    fired: AtomicBool,
}

impl OpenNotebookSource {
    pub const URN: &'static str = "mentoracademy.org/schemas/events/1.0.0/OpenNotebookEvent";

    pub fn new(ctx: &SourceContext) -> Self {
        Self {
            notebook: Arc::downgrade(&ctx.notebook),
            emitter: Arc::clone(&ctx.emitter),
            enabled: AtomicBool::new(false),
            fired: AtomicBool::new(false),
        }
    }
}

impl Toggle for OpenNotebookSource {
    fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn started(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.enabled.load(Ordering::SeqCst) {
            debug!("open event disabled; not emitting");
            return;
        }
        let Some(notebook) = self.notebook.upgrade() else {
            return;
        };
        let cells = notebook
            .cells()
            .iter()
            .enumerate()
            .map(|(index, cell)| CellMeta::new(cell.id(), index))
            .collect();
        self.emitter.emit(EventName::OpenNotebook, cells);
    }
}
