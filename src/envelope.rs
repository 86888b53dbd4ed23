// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Outbound message types and the assembler.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::notebook::Notebook;
use crate::tracker::DocumentSnapshot;

/// Names of the events on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    SaveNotebook,
    CellExecuted,
    /// Reserved by the collectors; nothing in this crate emits it.
    ExecuteCell,
    Scroll,
    ActiveCellChanged,
    OpenNotebook,
    AddCell,
    RemoveCell,
}

impl EventName {
    pub const ALL: [EventName; 8] = [
        EventName::SaveNotebook,
        EventName::CellExecuted,
        EventName::ExecuteCell,
        EventName::Scroll,
        EventName::ActiveCellChanged,
        EventName::OpenNotebook,
        EventName::AddCell,
        EventName::RemoveCell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SaveNotebook => "save_notebook",
            EventName::CellExecuted => "cell_executed",
            EventName::ExecuteCell => "execute_cell",
            EventName::Scroll => "scroll",
            EventName::ActiveCellChanged => "active_cell_changed",
            EventName::OpenNotebook => "open_notebook",
            EventName::AddCell => "add_cell",
            EventName::RemoveCell => "remove_cell",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cell affected by an event and its position at event time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMeta {
    pub id: String,
    pub index: usize,
}

impl CellMeta {
    pub fn new(id: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.into(),
            index,
        }
    }
}

/// The fully assembled outbound message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_name: EventName,
    pub cells: Vec<CellMeta>,
    #[serde(flatten)]
    pub snapshot: DocumentSnapshot,
    pub user_id: String,
    pub notebook_path: String,
}

impl EventEnvelope {
    pub fn seq(&self) -> u64 {
        self.snapshot.seq
    }

    /// JSON body as sent to the collector.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Who sent the event and from which document, as of now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub notebook_path: String,
}

/// Source of [`Identity`] for one document.
///
/// The path is read from the notebook on every [`resolve`](Self::resolve),
/// so renames show up in the next message.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    user_id: String,
    notebook: Weak<Notebook>,
}

impl IdentityContext {
    pub fn new(user_id: impl Into<String>, notebook: &Arc<Notebook>) -> Self {
        Self {
            user_id: user_id.into(),
            notebook: Arc::downgrade(notebook),
        }
    }

    pub fn resolve(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            notebook_path: self
                .notebook
                .upgrade()
                .map(|notebook| notebook.path())
                .unwrap_or_default(),
        }
    }
}

/// Merge an event, a snapshot and the sender identity into one envelope.
pub fn assemble(
    event_name: EventName,
    cells: Vec<CellMeta>,
    snapshot: DocumentSnapshot,
    identity: Identity,
) -> EventEnvelope {
    EventEnvelope {
        event_name,
        cells,
        snapshot,
        user_id: identity.user_id,
        notebook_path: identity.notebook_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::Cell;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_event_names_on_wire() {
        for name in EventName::ALL {
            let json = serde_json::to_value(name).unwrap();
            assert_eq!(json, json!(name.as_str()));
            let back: EventName = serde_json::from_value(json).unwrap();
            assert_eq!(back, name);
        }
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = assemble(
            EventName::OpenNotebook,
            vec![CellMeta::new("c1", 0)],
            DocumentSnapshot {
                notebook: json!({"cells": [{"id": "c1"}]}),
                seq: 4,
            },
            Identity {
                user_id: "u1".to_string(),
                notebook_path: "a.ipynb".to_string(),
            },
        );

        assert_eq!(
            envelope.to_json().unwrap(),
            json!({
                "event_name": "open_notebook",
                "cells": [{"id": "c1", "index": 0}],
                "notebook": {"cells": [{"id": "c1"}]},
                "seq": 4,
                "user_id": "u1",
                "notebook_path": "a.ipynb",
            })
        );
        assert_eq!(envelope.seq(), 4);
    }

    #[test]
    fn test_identity_tracks_rename() {
        let notebook = Arc::new(Notebook::new("old.ipynb", vec![Cell::code("c", "")]));
        let context = IdentityContext::new("u", &notebook);
        assert_eq!(context.resolve().notebook_path, "old.ipynb");
        notebook.rename("new.ipynb");
        assert_eq!(context.resolve().notebook_path, "new.ipynb");
    }
}
