// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Single-cell events: executed, activated, inserted and removed.

use std::sync::{Arc, Weak};

use tracing::debug;

use super::{SourceContext, SubscriptionSlot};
use crate::dispatcher::Emitter;
use crate::envelope::{CellMeta, EventName};
use crate::notebook::{CellListChange, Host, Notebook, NotebookId};
use crate::toggle::Toggle;

/// Emits `cell_executed` for cells of this document that finish executing.
pub struct CellExecutedSource {
    notebook: Weak<Notebook>,
    notebook_id: NotebookId,
    host: Weak<Host>,
    emitter: Arc<Emitter>,
    slot: SubscriptionSlot,
}

impl CellExecutedSource {
    pub const URN: &'static str = "mentoracademy.org/schemas/events/1.0.0/CellExecutedEvent";

    pub fn new(ctx: &SourceContext) -> Self {
        Self {
            notebook: Arc::downgrade(&ctx.notebook),
            notebook_id: ctx.notebook.id(),
            host: Arc::downgrade(&ctx.host),
            emitter: Arc::clone(&ctx.emitter),
            slot: SubscriptionSlot::default(),
        }
    }
}

impl Toggle for CellExecutedSource {
    fn enable(&self) {
        let Some(host) = self.host.upgrade() else {
            return;
        };
        let weak = self.notebook.clone();
        let id = self.notebook_id;
        let emitter = Arc::clone(&self.emitter);
        self.slot.hold(host.executed.connect(move |executed| {
            if executed.notebook != id {
                return;
            }
            let Some(notebook) = weak.upgrade() else {
                return;
            };
            match notebook.index_of(executed.cell.key()) {
                Some(index) => {
                    emitter.emit(
                        EventName::CellExecuted,
                        vec![CellMeta::new(executed.cell.id(), index)],
                    );
                }
                None => debug!(cell = executed.cell.id(), "executed cell no longer in notebook"),
            }
        }));
    }

    fn disable(&self) {
        self.slot.release();
    }
}

/// Emits `active_cell_changed` with the newly active cell.
pub struct ActiveCellChangedSource {
    notebook: Weak<Notebook>,
    emitter: Arc<Emitter>,
    slot: SubscriptionSlot,
}

impl ActiveCellChangedSource {
    pub const URN: &'static str = "mentoracademy.org/schemas/events/1.0.0/ActiveCellChangedEvent";

    pub fn new(ctx: &SourceContext) -> Self {
        Self {
            notebook: Arc::downgrade(&ctx.notebook),
            emitter: Arc::clone(&ctx.emitter),
            slot: SubscriptionSlot::default(),
        }
    }
}

impl Toggle for ActiveCellChangedSource {
    fn enable(&self) {
        let Some(notebook) = self.notebook.upgrade() else {
            return;
        };
        let emitter = Arc::clone(&self.emitter);
        self.slot
            .hold(notebook.active_cell_changed.connect(move |changed| {
                emitter.emit(
                    EventName::ActiveCellChanged,
                    vec![CellMeta::new(changed.cell.id(), changed.index)],
                );
            }));
    }

    fn disable(&self) {
        self.slot.release();
    }
}

/// Emits `add_cell` with the inserted cell at its insertion index.
pub struct AddCellSource {
    notebook: Weak<Notebook>,
    emitter: Arc<Emitter>,
    slot: SubscriptionSlot,
}

impl AddCellSource {
    pub const URN: &'static str = "mentoracademy.org/schemas/events/1.0.0/AddCellEvent";

    pub fn new(ctx: &SourceContext) -> Self {
        Self {
            notebook: Arc::downgrade(&ctx.notebook),
            emitter: Arc::clone(&ctx.emitter),
            slot: SubscriptionSlot::default(),
        }
    }
}

impl Toggle for AddCellSource {
    fn enable(&self) {
        let Some(notebook) = self.notebook.upgrade() else {
            return;
        };
        let emitter = Arc::clone(&self.emitter);
        self.slot.hold(notebook.cells_changed.connect(move |change| {
            if let CellListChange::Added { index, cell } = change {
                emitter.emit(EventName::AddCell, vec![CellMeta::new(cell.id(), *index)]);
            }
        }));
    }

    fn disable(&self) {
        self.slot.release();
    }
}

/// Emits `remove_cell` with the removed cell at the index it occupied.
pub struct RemoveCellSource {
    notebook: Weak<Notebook>,
    emitter: Arc<Emitter>,
    slot: SubscriptionSlot,
}

impl RemoveCellSource {
    pub const URN: &'static str = "mentoracademy.org/schemas/events/1.0.0/RemoveCellEvent";

    pub fn new(ctx: &SourceContext) -> Self {
        Self {
            notebook: Arc::downgrade(&ctx.notebook),
            emitter: Arc::clone(&ctx.emitter),
            slot: SubscriptionSlot::default(),
        }
    }
}

impl Toggle for RemoveCellSource {
    fn enable(&self) {
        let Some(notebook) = self.notebook.upgrade() else {
            return;
        };
        let emitter = Arc::clone(&self.emitter);
        self.slot.hold(notebook.cells_changed.connect(move |change| {
            if let CellListChange::Removed { index, cell } = change {
                emitter.emit(EventName::RemoveCell, vec![CellMeta::new(cell.id(), *index)]);
            }
        }));
    }

    fn disable(&self) {
        self.slot.release();
    }
}
