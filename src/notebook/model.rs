// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The notebook document and the app-wide host signals.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};

use super::cell::{Cell, CellKey};
use super::signal::{lock, Signal};

static NEXT_NOTEBOOK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an open notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotebookId(u64);

/// Change to the notebook's cell list.
#[derive(Debug, Clone)]
pub enum CellListChange {
    /// `cell` now sits at `index`.
    Added { index: usize, cell: Arc<Cell> },
    /// `cell` was at `index` before it was removed.
    Removed { index: usize, cell: Arc<Cell> },
}

/// Progress of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Started,
    Completed,
    Failed,
}

/// The newly active cell.
#[derive(Debug, Clone)]
pub struct ActiveCellChanged {
    pub index: usize,
    pub cell: Arc<Cell>,
}

/// Scroll position and height of the notebook viewport.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub client_height: f64,
}

impl Viewport {
    pub fn bottom(&self) -> f64 {
        self.scroll_top + self.client_height
    }
}

#[derive(Debug)]
struct NotebookContent {
    path: String,
    cells: Vec<Arc<Cell>>,
    active: Option<CellKey>,
    selected: HashSet<CellKey>,
    viewport: Viewport,
    metadata: Map<String, Value>,
}

/// An open notebook document.
///
/// Mutators update the content first and emit afterwards, so handlers can
/// read the notebook freely.
#[derive(Debug)]
pub struct Notebook {
    id: NotebookId,
    content: Mutex<NotebookContent>,
    closed: AtomicBool,
    pub cells_changed: Signal<CellListChange>,
    pub active_cell_changed: Signal<ActiveCellChanged>,
    pub save_state_changed: Signal<SaveState>,
    pub scrolled: Signal<()>,
    pub disposed: Signal<()>,
}

impl Notebook {
    /// Create a notebook holding `cells` in order.
    pub fn new(path: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            id: NotebookId(NEXT_NOTEBOOK_ID.fetch_add(1, Ordering::Relaxed)),
            content: Mutex::new(NotebookContent {
                path: path.into(),
                cells: cells.into_iter().map(Arc::new).collect(),
                active: None,
                selected: HashSet::new(),
                viewport: Viewport::default(),
                metadata: Map::new(),
            }),
            closed: AtomicBool::new(false),
            cells_changed: Signal::new("notebook.cells_changed"),
            active_cell_changed: Signal::new("notebook.active_cell_changed"),
            save_state_changed: Signal::new("notebook.save_state_changed"),
            scrolled: Signal::new("notebook.scrolled"),
            disposed: Signal::new("notebook.disposed"),
        }
    }

    pub fn id(&self) -> NotebookId {
        self.id
    }

    /// Current path; changes when the document is renamed.
    pub fn path(&self) -> String {
        lock(&self.content).path.clone()
    }

    pub fn rename(&self, path: impl Into<String>) {
        lock(&self.content).path = path.into();
    }

    pub fn set_metadata(&self, metadata: Map<String, Value>) {
        lock(&self.content).metadata = metadata;
    }

    /// The live cells, in document order.
    pub fn cells(&self) -> Vec<Arc<Cell>> {
        lock(&self.content).cells.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.content).cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_at(&self, index: usize) -> Option<Arc<Cell>> {
        lock(&self.content).cells.get(index).cloned()
    }

    /// Current position of a cell, if it is still live.
    pub fn index_of(&self, key: CellKey) -> Option<usize> {
        lock(&self.content)
            .cells
            .iter()
            .position(|cell| cell.key() == key)
    }

    /// Find a live cell by host id.
    pub fn find(&self, id: &str) -> Option<(usize, Arc<Cell>)> {
        lock(&self.content)
            .cells
            .iter()
            .enumerate()
            .find(|(_, cell)| cell.id() == id)
            .map(|(index, cell)| (index, Arc::clone(cell)))
    }

    /// Insert a cell at `index` (clamped to the end).
    pub fn insert_cell(&self, index: usize, cell: Cell) -> Arc<Cell> {
        let cell = Arc::new(cell);
        let index = {
            let mut content = lock(&self.content);
            let index = index.min(content.cells.len());
            content.cells.insert(index, Arc::clone(&cell));
            index
        };
        self.cells_changed.emit(&CellListChange::Added {
            index,
            cell: Arc::clone(&cell),
        });
        cell
    }

    /// Remove the cell at `index`.
    pub fn remove_cell(&self, index: usize) -> Option<Arc<Cell>> {
        let cell = {
            let mut content = lock(&self.content);
            if index >= content.cells.len() {
                return None;
            }
            let cell = content.cells.remove(index);
            content.selected.remove(&cell.key());
            if content.active == Some(cell.key()) {
                content.active = None;
            }
            cell
        };
        self.cells_changed.emit(&CellListChange::Removed {
            index,
            cell: Arc::clone(&cell),
        });
        Some(cell)
    }

    /// Make the cell at `index` active.
    pub fn activate(&self, index: usize) -> Option<Arc<Cell>> {
        let cell = {
            let mut content = lock(&self.content);
            let cell = content.cells.get(index).cloned()?;
            content.active = Some(cell.key());
            cell
        };
        self.active_cell_changed.emit(&ActiveCellChanged {
            index,
            cell: Arc::clone(&cell),
        });
        Some(cell)
    }

    pub fn active_cell(&self) -> Option<Arc<Cell>> {
        let content = lock(&self.content);
        let active = content.active?;
        content.cells.iter().find(|cell| cell.key() == active).cloned()
    }

    /// Replace the selection with the given cells.
    pub fn select(&self, keys: impl IntoIterator<Item = CellKey>) {
        lock(&self.content).selected = keys.into_iter().collect();
    }

    pub fn is_selected_or_active(&self, key: CellKey) -> bool {
        let content = lock(&self.content);
        content.active == Some(key) || content.selected.contains(&key)
    }

    pub fn set_save_state(&self, state: SaveState) {
        self.save_state_changed.emit(&state);
    }

    pub fn viewport(&self) -> Viewport {
        lock(&self.content).viewport
    }

    pub fn set_viewport_height(&self, client_height: f64) {
        lock(&self.content).viewport.client_height = client_height;
    }

    /// Move the viewport and report the scroll.
    pub fn scroll_to(&self, scroll_top: f64) {
        lock(&self.content).viewport.scroll_top = scroll_top;
        self.scrolled.emit(&());
    }

    /// Close the document. Fires `disposed` once.
    pub fn dispose(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disposed.emit(&());
    }

    pub fn is_disposed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Serialize in nbformat 4 form.
    pub fn to_json(&self) -> Value {
        self.serialize().1
    }

    /// Serialize, also returning the cells in the order they were written.
    ///
    /// `cells[i]` is the cell serialized at `json["cells"][i]`.
    pub fn serialize(&self) -> (Vec<Arc<Cell>>, Value) {
        let (cells, metadata) = {
            let content = lock(&self.content);
            (content.cells.clone(), content.metadata.clone())
        };
        let json = json!({
            "cells": cells.iter().map(|cell| cell.to_json()).collect::<Vec<_>>(),
            "metadata": metadata,
            "nbformat": 4,
            "nbformat_minor": 5,
        });
        (cells, json)
    }
}

/// A cell finished executing somewhere in the application.
#[derive(Debug, Clone)]
pub struct CellExecuted {
    pub notebook: NotebookId,
    pub cell: Arc<Cell>,
}

/// Signals that are not tied to one notebook.
#[derive(Debug)]
pub struct Host {
    pub executed: Signal<CellExecuted>,
}

impl Host {
    pub fn new() -> Self {
        Self {
            executed: Signal::new("host.executed"),
        }
    }

    /// Report that `cell` of `notebook` was executed.
    pub fn report_executed(&self, notebook: &Notebook, cell: Arc<Cell>) {
        self.executed.emit(&CellExecuted {
            notebook: notebook.id(),
            cell,
        });
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}
