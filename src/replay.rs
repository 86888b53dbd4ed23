// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scripted host sessions.
//!
//! A replay script is a JSON-lines file of host actions. Each line drives
//! the notebook model the way an editor would, so the capture pipeline sees
//! the same signals it sees in a live session:
//!
//! ```text
//! # open a two-cell notebook, edit and run the first cell, save
//! {"action": "open", "path": "lab1.ipynb", "cells": [{"id": "c1", "source": "1 + 1"}, {"id": "c2"}]}
//! {"action": "edit", "cell": "c1", "source": "2 + 2"}
//! {"action": "execute", "cell": "c1", "result": "4"}
//! {"action": "save"}
//! {"action": "wait", "ms": 500}
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ReplayError;
use crate::extension::TelemetryExtension;
use crate::notebook::{Cell, CellKind, CellOutput, Extent, Notebook, SaveState};

/// A cell as written in a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSpec {
    pub id: String,
    #[serde(default = "default_kind")]
    pub kind: CellKind,
    #[serde(default)]
    pub source: String,
}

fn default_kind() -> CellKind {
    CellKind::Code
}

impl CellSpec {
    fn build(&self) -> Cell {
        Cell::new(self.id.clone(), self.kind, self.source.clone())
    }
}

/// One host action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    /// Open a notebook and start capturing it.
    Open {
        path: String,
        #[serde(default)]
        cells: Vec<CellSpec>,
        /// Notebook-level metadata such as the kernelspec.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
    Edit {
        cell: String,
        source: String,
    },
    /// Run a cell: clear its outputs, append the given ones and report the
    /// execution.
    Execute {
        cell: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        stdout: Option<String>,
    },
    Insert {
        index: usize,
        cell: CellSpec,
    },
    Remove {
        index: usize,
    },
    Activate {
        index: usize,
    },
    Select {
        cells: Vec<String>,
    },
    Save,
    /// Stack cells vertically with the given heights and size the viewport.
    Layout {
        heights: Vec<f64>,
        viewport: f64,
    },
    Scroll {
        top: f64,
    },
    Rename {
        path: String,
    },
    Wait {
        ms: u64,
    },
    Close,
}

/// Parse a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> Result<Vec<ReplayAction>, ReplayError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| ReplayError::Parse {
                line: number + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Read and parse a script file.
pub fn load_script(path: &Path) -> Result<Vec<ReplayAction>, ReplayError> {
    let text = std::fs::read_to_string(path)?;
    parse_script(&text)
}

/// Applies actions to a notebook tracked by an extension.
pub struct Replay {
    extension: Arc<TelemetryExtension>,
    notebook: Option<Arc<Notebook>>,
    path_override: Option<String>,
    execution_count: u64,
}

impl Replay {
    pub fn new(extension: Arc<TelemetryExtension>) -> Self {
        Self {
            extension,
            notebook: None,
            path_override: None,
            execution_count: 0,
        }
    }

    /// Use `path` for every opened notebook instead of the scripted one.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path_override = Some(path.into());
        self
    }

    /// The notebook opened by the last `open` action.
    pub fn notebook(&self) -> Option<&Arc<Notebook>> {
        self.notebook.as_ref()
    }

    /// Apply every action in order. Returns the number applied.
    pub async fn run(&mut self, actions: &[ReplayAction]) -> Result<usize, ReplayError> {
        for action in actions {
            self.apply(action).await?;
        }
        info!(actions = actions.len(), "replay finished");
        Ok(actions.len())
    }

    pub async fn apply(&mut self, action: &ReplayAction) -> Result<(), ReplayError> {
        debug!(?action, "replaying");
        match action {
            ReplayAction::Open { path, cells, metadata } => {
                let path = self.path_override.clone().unwrap_or_else(|| path.clone());
                let notebook = Arc::new(Notebook::new(path, cells.iter().map(CellSpec::build).collect()));
                if let Some(metadata) = metadata {
                    notebook.set_metadata(metadata.clone());
                }
                // Sources and sinks must be live before the next action fires.
                self.extension.ready().await;
                let dispatcher = self.extension.track(&notebook)?;
                dispatcher.ready().await;
                self.notebook = Some(notebook);
            }
            ReplayAction::Edit { cell, source } => {
                self.cell(cell)?.set_source(source.clone());
            }
            ReplayAction::Execute { cell, result, stdout } => {
                let cell = self.cell(cell)?;
                cell.clear_outputs();
                if let Some(text) = stdout {
                    cell.push_output(CellOutput::stdout(text.clone()));
                }
                if let Some(value) = result {
                    cell.push_output(CellOutput::result("text/plain", value.clone()));
                }
                self.execution_count += 1;
                cell.set_execution_count(Some(self.execution_count));
                self.extension.host().report_executed(self.current()?, cell);
            }
            ReplayAction::Insert { index, cell } => {
                let notebook = self.current()?;
                if *index > notebook.len() {
                    return Err(ReplayError::IndexOutOfRange {
                        index: *index,
                        len: notebook.len(),
                    });
                }
                notebook.insert_cell(*index, cell.build());
            }
            ReplayAction::Remove { index } => {
                let notebook = self.current()?;
                notebook.remove_cell(*index).ok_or_else(|| ReplayError::IndexOutOfRange {
                    index: *index,
                    len: notebook.len(),
                })?;
            }
            ReplayAction::Activate { index } => {
                let notebook = self.current()?;
                notebook.activate(*index).ok_or_else(|| ReplayError::IndexOutOfRange {
                    index: *index,
                    len: notebook.len(),
                })?;
            }
            ReplayAction::Select { cells } => {
                let keys = cells
                    .iter()
                    .map(|id| self.cell(id).map(|cell| cell.key()))
                    .collect::<Result<Vec<_>, _>>()?;
                self.current()?.select(keys);
            }
            ReplayAction::Save => {
                let notebook = self.current()?;
                notebook.set_save_state(SaveState::Started);
                notebook.set_save_state(SaveState::Completed);
            }
            ReplayAction::Layout { heights, viewport } => {
                let notebook = self.current()?;
                let mut top = 0.0;
                for (cell, height) in notebook.cells().iter().zip(heights) {
                    cell.set_extent(Extent::new(top, *height));
                    top += height;
                }
                notebook.set_viewport_height(*viewport);
            }
            ReplayAction::Scroll { top } => self.current()?.scroll_to(*top),
            ReplayAction::Rename { path } => self.current()?.rename(path.clone()),
            ReplayAction::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            ReplayAction::Close => {
                if let Some(notebook) = self.notebook.take() {
                    notebook.dispose();
                }
            }
        }
        Ok(())
    }

    fn current(&self) -> Result<&Arc<Notebook>, ReplayError> {
        self.notebook.as_ref().ok_or(ReplayError::NotOpen)
    }

    fn cell(&self, id: &str) -> Result<Arc<Cell>, ReplayError> {
        self.current()?
            .find(id)
            .map(|(_, cell)| cell)
            .ok_or_else(|| ReplayError::UnknownCell(id.to_string()))
    }
}
