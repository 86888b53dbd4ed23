// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Notebook cells.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::signal::{lock, Signal};

static NEXT_CELL_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a cell object.
///
/// Two cells carrying the same host id are still different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(u64);

impl CellKey {
    fn next() -> Self {
        Self(NEXT_CELL_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

/// Cell type, as in nbformat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Raw,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellKind::Code => "code",
            CellKind::Markdown => "markdown",
            CellKind::Raw => "raw",
        }
    }
}

/// One output item of a code cell.
///
/// `data` is keyed by mime type; stream output uses the
/// `application/vnd.jupyter.stdout` / `stderr` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellOutput {
    pub output_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CellOutput {
    /// An `execute_result` carrying one mime bundle entry.
    pub fn result(mime: impl Into<String>, value: Value) -> Self {
        let mut data = Map::new();
        data.insert(mime.into(), value);
        Self {
            output_type: "execute_result".to_string(),
            data,
            metadata: Map::new(),
        }
    }

    /// A stdout stream chunk.
    pub fn stdout(text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert(
            "application/vnd.jupyter.stdout".to_string(),
            Value::String(text.into()),
        );
        Self {
            output_type: "stream".to_string(),
            data,
            metadata: Map::new(),
        }
    }
}

/// Rendered vertical extent of a cell, in viewport pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub top: f64,
    pub height: f64,
}

impl Extent {
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Change to a cell's output list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputsChange {
    Added { index: usize },
    Cleared,
}

#[derive(Debug)]
struct CellContent {
    source: String,
    outputs: Vec<CellOutput>,
    execution_count: Option<u64>,
    metadata: Map<String, Value>,
    extent: Extent,
}

/// A live notebook cell, owned by the host and shared as `Arc<Cell>`.
#[derive(Debug)]
pub struct Cell {
    key: CellKey,
    id: String,
    kind: CellKind,
    content: Mutex<CellContent>,
    /// Fired after the source text changes.
    pub source_changed: Signal<()>,
    /// Fired after the output list changes (code cells only).
    pub outputs_changed: Signal<OutputsChange>,
}

impl Cell {
    pub fn new(id: impl Into<String>, kind: CellKind, source: impl Into<String>) -> Self {
        Self {
            key: CellKey::next(),
            id: id.into(),
            kind,
            content: Mutex::new(CellContent {
                source: source.into(),
                outputs: Vec::new(),
                execution_count: None,
                metadata: Map::new(),
                extent: Extent::default(),
            }),
            source_changed: Signal::new("cell.source_changed"),
            outputs_changed: Signal::new("cell.outputs_changed"),
        }
    }

    pub fn code(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(id, CellKind::Code, source)
    }

    pub fn markdown(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(id, CellKind::Markdown, source)
    }

    pub fn key(&self) -> CellKey {
        self.key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }

    pub fn source(&self) -> String {
        lock(&self.content).source.clone()
    }

    pub fn outputs(&self) -> Vec<CellOutput> {
        lock(&self.content).outputs.clone()
    }

    pub fn extent(&self) -> Extent {
        lock(&self.content).extent
    }

    /// Replace the source text.
    pub fn set_source(&self, source: impl Into<String>) {
        lock(&self.content).source = source.into();
        self.source_changed.emit(&());
    }

    /// Append an output. Ignored for non-code cells.
    pub fn push_output(&self, output: CellOutput) {
        if !self.is_code() {
            return;
        }
        let index = {
            let mut content = lock(&self.content);
            content.outputs.push(output);
            content.outputs.len() - 1
        };
        self.outputs_changed.emit(&OutputsChange::Added { index });
    }

    /// Drop all outputs, as the host does before re-executing a cell.
    pub fn clear_outputs(&self) {
        if !self.is_code() {
            return;
        }
        lock(&self.content).outputs.clear();
        self.outputs_changed.emit(&OutputsChange::Cleared);
    }

    pub fn set_execution_count(&self, count: Option<u64>) {
        lock(&self.content).execution_count = count;
    }

    pub fn set_extent(&self, extent: Extent) {
        lock(&self.content).extent = extent;
    }

    /// Serialize in nbformat 4 cell form.
    pub fn to_json(&self) -> Value {
        let content = lock(&self.content);
        let mut cell = json!({
            "id": self.id,
            "cell_type": self.kind.as_str(),
            "source": content.source,
            "metadata": content.metadata,
        });
        if self.is_code() {
            cell["outputs"] = content
                .outputs
                .iter()
                .map(output_to_json)
                .collect::<Vec<_>>()
                .into();
            cell["execution_count"] = content.execution_count.into();
        }
        cell
    }
}

fn output_to_json(output: &CellOutput) -> Value {
    json!({
        "output_type": output.output_type,
        "data": output.data,
        "metadata": output.metadata,
    })
}
