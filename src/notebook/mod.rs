// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Host document model.
//!
//! The editor integration drives these types: it mutates a [`Notebook`] and
//! its [`Cell`]s and reports app-wide transitions through [`Host`]. Capture
//! units only ever observe them through [`Signal`]s.
//!
//! - [`Signal`] / [`Subscription`] - observer fan-out with explicit tokens
//! - [`Cell`] - one cell with its source, outputs and layout extent
//! - [`Notebook`] - ordered cells, selection, viewport, save state
//! - [`Host`] - signals spanning all notebooks (cell execution)

mod cell;
mod model;
mod signal;

pub use cell::{Cell, CellKey, CellKind, CellOutput, Extent, OutputsChange};
pub use model::{
    ActiveCellChanged, CellExecuted, CellListChange, Host, Notebook, NotebookId, SaveState,
    Viewport,
};
pub use signal::{Signal, Subscription};

pub(crate) use signal::lock;
