// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Differential document state.
//!
//! [`StateTracker`] keeps one record per live cell: a dirty flag and a
//! fingerprint of the cell's outputs. [`StateTracker::take_snapshot`]
//! serializes the notebook with unchanged cells reduced to `{id}` stubs,
//! then clears every dirty flag and advances the sequence number.
//!
//! Records hold only a `Weak<Cell>`. A record is evicted when its cell is
//! removed from the notebook or dropped by the host, which also releases the
//! per-cell listeners.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::error::TelemetryError;
use crate::notebook::{lock, Cell, CellKey, CellListChange, Notebook, OutputsChange, Subscription};

/// Serialized notebook plus the sequence number it was taken under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub notebook: Value,
    pub seq: u64,
}

struct CellRecord {
    cell: Weak<Cell>,
    changed: bool,
    fingerprint: String,
    _listeners: Vec<Subscription>,
}

#[derive(Default)]
struct TrackerState {
    records: HashMap<CellKey, CellRecord>,
    seq: u64,
}

/// Per-document dirty tracking.
pub struct StateTracker {
    notebook: Weak<Notebook>,
    state: Arc<Mutex<TrackerState>>,
    list_subscription: Mutex<Option<Subscription>>,
}

impl StateTracker {
    /// Start tracking `notebook`: record every current cell and follow
    /// insertions and removals.
    pub fn new(notebook: &Arc<Notebook>) -> Arc<Self> {
        let tracker = Arc::new(Self {
            notebook: Arc::downgrade(notebook),
            state: Arc::new(Mutex::new(TrackerState::default())),
            list_subscription: Mutex::new(None),
        });
        tracker.sync();

        let weak = Arc::downgrade(&tracker);
        let subscription = notebook.cells_changed.connect(move |change| {
            let Some(tracker) = weak.upgrade() else {
                return;
            };
            match change {
                CellListChange::Added { .. } => tracker.sync(),
                CellListChange::Removed { cell, .. } => tracker.forget(cell.key()),
            }
        });
        *lock(&tracker.list_subscription) = Some(subscription);

        tracker
    }

    /// Create records for live cells that have none and evict records whose
    /// cell is gone. Idempotent.
    pub fn sync(&self) {
        let Some(notebook) = self.notebook.upgrade() else {
            return;
        };
        let cells = notebook.cells();
        let live: HashSet<CellKey> = cells.iter().map(|cell| cell.key()).collect();

        let mut state = lock(&self.state);
        state
            .records
            .retain(|key, record| live.contains(key) && record.cell.strong_count() > 0);

        for cell in &cells {
            if state.records.contains_key(&cell.key()) {
                continue;
            }
            trace!(cell_id = cell.id(), "tracking new cell");
            let record = CellRecord {
                cell: Arc::downgrade(cell),
                changed: true,
                fingerprint: fingerprint(cell),
                _listeners: self.watch(cell),
            };
            state.records.insert(cell.key(), record);
        }
    }

    /// Drop the record for a removed cell.
    pub fn forget(&self, key: CellKey) {
        if lock(&self.state).records.remove(&key).is_some() {
            trace!(?key, "stopped tracking cell");
        }
    }

    fn watch(&self, cell: &Arc<Cell>) -> Vec<Subscription> {
        let key = cell.key();
        let mut listeners = Vec::with_capacity(2);

        let state = Arc::downgrade(&self.state);
        listeners.push(cell.source_changed.connect(move |_| {
            let Some(state) = state.upgrade() else {
                return;
            };
            if let Some(record) = lock(&state).records.get_mut(&key) {
                record.changed = true;
            };
        }));

        if cell.is_code() {
            let state = Arc::downgrade(&self.state);
            let weak_cell = Arc::downgrade(cell);
            listeners.push(cell.outputs_changed.connect(move |change| {
                if !matches!(change, OutputsChange::Added { .. }) {
                    return;
                }
                let (Some(state), Some(cell)) = (state.upgrade(), weak_cell.upgrade()) else {
                    return;
                };
                let current = fingerprint(&cell);
                if let Some(record) = lock(&state).records.get_mut(&key) {
                    if record.fingerprint != current {
                        record.changed = true;
                        record.fingerprint = current;
                    }
                };
            }));
        }

        listeners
    }

    /// Serialize the notebook, stub unchanged cells, reset every dirty flag
    /// and advance the sequence number.
    ///
    /// Returns the sequence number of this snapshot. Runs entirely under the
    /// tracker lock, so no listener observes a partially reset state.
    pub fn take_snapshot(&self) -> Result<DocumentSnapshot, TelemetryError> {
        let notebook = self.notebook.upgrade().ok_or(TelemetryError::DocumentClosed)?;

        let mut state = lock(&self.state);
        let (cells, mut document) = notebook.serialize();

        let mut stubbed = 0usize;
        if let Some(serialized) = document.get_mut("cells").and_then(Value::as_array_mut) {
            for (cell, slot) in cells.iter().zip(serialized.iter_mut()) {
                // A cell without a record has not been synced yet; send it whole.
                let unchanged = state
                    .records
                    .get(&cell.key())
                    .is_some_and(|record| !record.changed);
                if unchanged {
                    *slot = json!({ "id": cell.id() });
                    stubbed += 1;
                }
            }
        }

        for record in state.records.values_mut() {
            record.changed = false;
        }

        let seq = state.seq;
        state.seq += 1;

        debug!(seq, cells = cells.len(), stubbed, "took notebook snapshot");
        Ok(DocumentSnapshot {
            notebook: document,
            seq,
        })
    }

    /// Whether the cell changed since the last snapshot; `None` if untracked.
    pub fn is_changed(&self, key: CellKey) -> Option<bool> {
        lock(&self.state).records.get(&key).map(|record| record.changed)
    }

    /// Stored output fingerprint of a tracked cell.
    pub fn fingerprint_of(&self, key: CellKey) -> Option<String> {
        lock(&self.state)
            .records
            .get(&key)
            .map(|record| record.fingerprint.clone())
    }

    /// Number of tracked cells.
    pub fn tracked(&self) -> usize {
        lock(&self.state).records.len()
    }

    /// Sequence number the next snapshot will carry.
    pub fn next_seq(&self) -> u64 {
        lock(&self.state).seq
    }

    /// Stop following the notebook and release every per-cell listener.
    pub fn dispose(&self) {
        if let Some(subscription) = lock(&self.list_subscription).take() {
            subscription.disconnect();
        }
        let records = std::mem::take(&mut lock(&self.state).records);
        debug!(released = records.len(), "state tracker disposed");
    }
}

/// Summarize a cell's outputs: for each output, the JSON of every data
/// value in key order. Empty for non-code cells.
pub fn fingerprint(cell: &Cell) -> String {
    if !cell.is_code() {
        return String::new();
    }
    let mut fingerprint = String::new();
    for output in cell.outputs() {
        let mut keys: Vec<&String> = output.data.keys().collect();
        keys.sort();
        for key in keys {
            fingerprint.push_str(&output.data[key.as_str()].to_string());
        }
    }
    fingerprint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::CellOutput;

    fn notebook() -> Arc<Notebook> {
        Arc::new(Notebook::new(
            "a.ipynb",
            vec![
                Cell::code("c1", "x = 1"),
                Cell::code("c2", "x"),
                Cell::markdown("c3", "notes"),
            ],
        ))
    }

    fn key(nb: &Notebook, index: usize) -> CellKey {
        nb.cell_at(index).unwrap().key()
    }

    #[test]
    fn test_sync_marks_new_cells_changed() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        assert_eq!(tracker.tracked(), 3);
        for index in 0..3 {
            assert_eq!(tracker.is_changed(key(&nb, index)), Some(true));
        }
    }

    #[test]
    fn test_snapshot_resets_all_flags() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        tracker.take_snapshot().unwrap();
        for index in 0..3 {
            assert_eq!(tracker.is_changed(key(&nb, index)), Some(false));
        }
    }

    #[test]
    fn test_sync_is_idempotent() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        tracker.take_snapshot().unwrap();
        tracker.sync();
        tracker.sync();
        assert_eq!(tracker.tracked(), 3);
        assert_eq!(tracker.is_changed(key(&nb, 0)), Some(false));
    }

    #[test]
    fn test_edit_marks_changed() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        tracker.take_snapshot().unwrap();

        nb.cell_at(2).unwrap().set_source("edited");
        assert_eq!(tracker.is_changed(key(&nb, 2)), Some(true));
        assert_eq!(tracker.is_changed(key(&nb, 0)), Some(false));
    }

    #[test]
    fn test_identical_output_keeps_flag() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        let cell = nb.cell_at(0).unwrap();

        cell.push_output(CellOutput::stdout("1"));
        tracker.take_snapshot().unwrap();

        // Re-execution producing the same output.
        cell.clear_outputs();
        cell.push_output(CellOutput::stdout("1"));
        assert_eq!(tracker.is_changed(cell.key()), Some(false));

        cell.clear_outputs();
        cell.push_output(CellOutput::stdout("2"));
        assert_eq!(tracker.is_changed(cell.key()), Some(true));
        assert_eq!(tracker.fingerprint_of(cell.key()), Some("\"2\"".to_string()));
    }

    #[test]
    fn test_snapshot_minimization() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        tracker.take_snapshot().unwrap();

        nb.cell_at(1).unwrap().set_source("y = 2");
        let snapshot = tracker.take_snapshot().unwrap();
        let cells = snapshot.notebook["cells"].as_array().unwrap();

        assert_eq!(cells[0], json!({"id": "c1"}));
        assert_eq!(cells[1]["source"], "y = 2");
        assert_eq!(cells[1]["cell_type"], "code");
        assert_eq!(cells[2], json!({"id": "c3"}));
    }

    #[test]
    fn test_cell_without_record_is_sent_whole() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        tracker.take_snapshot().unwrap();

        let cell = nb.cell_at(1).unwrap();
        tracker.forget(cell.key());
        assert_eq!(tracker.is_changed(cell.key()), None);

        let snapshot = tracker.take_snapshot().unwrap();
        let cells = snapshot.notebook["cells"].as_array().unwrap();
        assert_eq!(cells[0], json!({"id": "c1"}));
        assert_eq!(cells[1]["source"], "x");
        assert_eq!(cells[2], json!({"id": "c3"}));
        assert_eq!(snapshot.seq, 1);
    }

    #[test]
    fn test_sequence_is_gap_free() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        let seqs: Vec<u64> = (0..5).map(|_| tracker.take_snapshot().unwrap().seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(tracker.next_seq(), 5);
    }

    #[test]
    fn test_inserted_cell_is_tracked_changed() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        tracker.take_snapshot().unwrap();

        let cell = nb.insert_cell(1, Cell::code("new", ""));
        assert_eq!(tracker.is_changed(cell.key()), Some(true));

        let snapshot = tracker.take_snapshot().unwrap();
        let cells = snapshot.notebook["cells"].as_array().unwrap();
        assert_eq!(cells[1]["source"], "");
        assert_eq!(cells[0], json!({"id": "c1"}));
    }

    #[test]
    fn test_removed_cell_is_evicted() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        let removed = nb.remove_cell(0).unwrap();

        assert_eq!(tracker.tracked(), 2);
        assert_eq!(tracker.is_changed(removed.key()), None);
        // Listeners went with the record.
        assert_eq!(removed.source_changed.handler_count(), 0);
        assert_eq!(removed.outputs_changed.handler_count(), 0);
    }

    #[test]
    fn test_tracker_does_not_keep_cells_alive() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        let removed = nb.remove_cell(2).unwrap();
        let weak = Arc::downgrade(&removed);
        drop(removed);
        assert!(weak.upgrade().is_none());
        assert_eq!(tracker.tracked(), 2);
    }

    #[test]
    fn test_snapshot_after_notebook_dropped() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        drop(nb);
        assert!(matches!(
            tracker.take_snapshot(),
            Err(TelemetryError::DocumentClosed)
        ));
    }

    #[test]
    fn test_dispose_releases_listeners() {
        let nb = notebook();
        let tracker = StateTracker::new(&nb);
        let cell = nb.cell_at(0).unwrap();
        assert_eq!(cell.source_changed.handler_count(), 1);

        tracker.dispose();
        assert_eq!(cell.source_changed.handler_count(), 0);
        assert_eq!(nb.cells_changed.handler_count(), 0);
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_fingerprint_sorts_keys() {
        let cell = Cell::code("c", "");
        let mut output = CellOutput::result("text/plain", json!("b"));
        output.data.insert("image/png".to_string(), json!("a"));
        cell.push_output(output);
        assert_eq!(fingerprint(&cell), "\"a\"\"b\"");
        assert_eq!(fingerprint(&Cell::markdown("m", "text")), "");
    }
}
