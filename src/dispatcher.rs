// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-document pipeline wiring.
//!
//! A [`Dispatcher`] is created for every tracked notebook. It owns the
//! document's [`StateTracker`], an [`Emitter`] shared by all of the
//! document's sources, and one [`ToggleSupervisor`] per source. Closing it
//! (explicitly or because the notebook was disposed) stops all capture for
//! the document and abandons its pending retries.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{Settings, EVENT_SETTINGS_KEY, DEFAULT_RETRY_DELAY_MS, DEFAULT_SCROLL_DEBOUNCE_MS};
use crate::envelope::{assemble, CellMeta, EventEnvelope, EventName, IdentityContext};
use crate::error::TelemetryError;
use crate::logging::GLOBAL_METRICS;
use crate::notebook::{lock, Host, Notebook, Subscription};
use crate::sinks::{fanout, ToggledSink};
use crate::sources::{SourceContext, SOURCE_REGISTRY};
use crate::toggle::ToggleSupervisor;
use crate::tracker::StateTracker;

/// Timing knobs for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    pub scroll_debounce: Duration,
    pub retry_delay: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            scroll_debounce: Duration::from_millis(DEFAULT_SCROLL_DEBOUNCE_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Entry point of the pipeline for one document: snapshot, assemble and fan
/// out to the sinks.
pub struct Emitter {
    tracker: Arc<StateTracker>,
    identity: IdentityContext,
    sinks: Vec<Arc<ToggledSink>>,
    runtime: Handle,
    retry_delay: Duration,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Emitter {
    pub fn new(
        tracker: Arc<StateTracker>,
        identity: IdentityContext,
        sinks: Vec<Arc<ToggledSink>>,
        runtime: Handle,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tracker,
            identity,
            sinks,
            runtime,
            retry_delay,
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    /// Snapshot the document now and send the resulting envelope to every
    /// sink. Returns the envelope, or `None` if nothing was sent.
    pub fn emit(&self, event_name: EventName, cells: Vec<CellMeta>) -> Option<Arc<EventEnvelope>> {
        if self.is_closed() {
            debug!(event = %event_name, "document closed; dropping event");
            return None;
        }

        let snapshot = match self.tracker.take_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(event = %event_name, error = %err, "failed to snapshot notebook");
                return None;
            }
        };

        let envelope = Arc::new(assemble(event_name, cells, snapshot, self.identity.resolve()));
        debug!(
            event = %event_name,
            seq = envelope.seq(),
            cells = envelope.cells.len(),
            "emitting event"
        );
        GLOBAL_METRICS.record_event(event_name);

        fanout(
            &self.runtime,
            &self.sinks,
            Arc::clone(&envelope),
            self.retry_delay,
            &self.cancel,
        );
        Some(envelope)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("sinks", &self.sinks)
            .field("retry_delay", &self.retry_delay)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Capture pipeline of one open notebook.
pub struct Dispatcher {
    notebook: Weak<Notebook>,
    tracker: Arc<StateTracker>,
    emitter: Arc<Emitter>,
    supervisors: Mutex<Vec<Arc<ToggleSupervisor>>>,
    cancel: CancellationToken,
    disposal: Mutex<Option<Subscription>>,
    closed: AtomicBool,
}

impl Dispatcher {
    /// Start capturing `notebook`.
    ///
    /// Must be called within a tokio runtime; toggle resolution, debounce
    /// timers and deliveries are spawned on it.
    pub fn open(
        notebook: &Arc<Notebook>,
        host: &Arc<Host>,
        settings: &Arc<Settings>,
        sinks: Vec<Arc<ToggledSink>>,
        user_id: impl Into<String>,
        options: DispatcherOptions,
    ) -> Result<Arc<Self>, TelemetryError> {
        let runtime = Handle::try_current().map_err(|e| TelemetryError::NoRuntime(e.to_string()))?;
        if notebook.is_disposed() {
            return Err(TelemetryError::DocumentClosed);
        }

        let cancel = CancellationToken::new();
        let tracker = StateTracker::new(notebook);
        let emitter = Arc::new(Emitter::new(
            Arc::clone(&tracker),
            IdentityContext::new(user_id, notebook),
            sinks,
            runtime.clone(),
            options.retry_delay,
            cancel.clone(),
        ));

        let context = SourceContext {
            notebook: Arc::clone(notebook),
            host: Arc::clone(host),
            emitter: Arc::clone(&emitter),
            runtime: runtime.clone(),
            cancel: cancel.clone(),
            scroll_debounce: options.scroll_debounce,
        };
        let supervisors = SOURCE_REGISTRY
            .iter()
            .map(|registration| {
                ToggleSupervisor::attach(
                    settings,
                    EVENT_SETTINGS_KEY,
                    registration.urn,
                    (registration.build)(&context),
                    &runtime,
                )
            })
            .collect();

        let dispatcher = Arc::new(Self {
            notebook: Arc::downgrade(notebook),
            tracker,
            emitter,
            supervisors: Mutex::new(supervisors),
            cancel,
            disposal: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&dispatcher);
        let disposal = notebook.disposed.connect(move |_| {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.close();
            }
        });
        *lock(&dispatcher.disposal) = Some(disposal);

        info!(path = %notebook.path(), "tracking notebook");
        Ok(dispatcher)
    }

    /// Stop capturing. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.emitter.close();
        self.cancel.cancel();

        let supervisors = std::mem::take(&mut *lock(&self.supervisors));
        for supervisor in &supervisors {
            supervisor.detach();
        }
        self.tracker.dispose();

        let disposal = lock(&self.disposal).take();
        if let Some(disposal) = disposal {
            disposal.disconnect();
        }

        let path = self.notebook.upgrade().map(|notebook| notebook.path()).unwrap_or_default();
        info!(path = %path, "stopped tracking notebook");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until every source has been resolved for the first time and
    /// the open event, if enabled, has been emitted.
    pub async fn ready(&self) {
        let supervisors = lock(&self.supervisors).clone();
        for supervisor in supervisors {
            supervisor.ready().await;
        }
    }

    pub fn emitter(&self) -> &Arc<Emitter> {
        &self.emitter
    }

    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    /// Whether the source registered under `urn` is currently enabled.
    pub fn is_source_enabled(&self, urn: &str) -> bool {
        lock(&self.supervisors)
            .iter()
            .any(|supervisor| supervisor.urn() == urn && supervisor.is_enabled())
    }

    pub fn notebook(&self) -> Option<Arc<Notebook>> {
        self.notebook.upgrade()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("emitter", &self.emitter)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HANDLER_SETTINGS_KEY;
    use crate::notebook::{Cell, CellOutput, Extent, SaveState};
    use crate::sinks::testing::RecordingSink;
    use crate::sinks::COLLECTOR_SINK_URN;
    use crate::sources::{OpenNotebookSource, ScrollSource};
    use crate::toggle::Toggle;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Harness {
        notebook: Arc<Notebook>,
        host: Arc<Host>,
        settings: Arc<Settings>,
        recorder: Arc<RecordingSink>,
        dispatcher: Arc<Dispatcher>,
    }

    fn all_enabled() -> Arc<Settings> {
        let events: serde_json::Map<String, serde_json::Value> = SOURCE_REGISTRY
            .iter()
            .map(|r| (r.urn.to_string(), json!({"enable": true})))
            .collect();
        let mut values = BTreeMap::new();
        values.insert(EVENT_SETTINGS_KEY.to_string(), serde_json::Value::Object(events));
        values.insert(
            HANDLER_SETTINGS_KEY.to_string(),
            json!({ COLLECTOR_SINK_URN: {"enable": true} }),
        );
        Arc::new(Settings::new(values))
    }

    fn harness(settings: Arc<Settings>) -> Harness {
        let notebook = Arc::new(Notebook::new(
            "course/lab1.ipynb",
            vec![Cell::code("c1", "a = 1"), Cell::code("c2", "b = 2"), Cell::markdown("c3", "# notes")],
        ));
        let host = Arc::new(Host::new());
        let recorder = Arc::new(RecordingSink::default());
        let sink = Arc::new(ToggledSink::new(recorder.clone()));
        sink.enable();

        let dispatcher = Dispatcher::open(
            &notebook,
            &host,
            &settings,
            vec![sink],
            "student",
            DispatcherOptions {
                scroll_debounce: Duration::from_millis(1000),
                retry_delay: Duration::from_millis(1000),
            },
        )
        .unwrap();

        Harness {
            notebook,
            host,
            settings,
            recorder,
            dispatcher,
        }
    }

    /// Let spawned resolution and delivery tasks run.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn names(recorder: &RecordingSink) -> Vec<EventName> {
        recorder.sent().iter().map(|e| e.event_name).collect()
    }

    #[test]
    fn test_open_requires_runtime() {
        let notebook = Arc::new(Notebook::new("a.ipynb", vec![]));
        let result = Dispatcher::open(
            &notebook,
            &Arc::new(Host::new()),
            &all_enabled(),
            vec![],
            "u",
            DispatcherOptions::default(),
        );
        assert!(matches!(result, Err(TelemetryError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_disposed_notebook() {
        let notebook = Arc::new(Notebook::new("a.ipynb", vec![]));
        notebook.dispose();
        let result = Dispatcher::open(
            &notebook,
            &Arc::new(Host::new()),
            &all_enabled(),
            vec![],
            "u",
            DispatcherOptions::default(),
        );
        assert!(matches!(result, Err(TelemetryError::DocumentClosed)));
    }

    #[tokio::test]
    async fn test_open_event_has_every_cell_in_full() {
        let h = harness(all_enabled());
        settle().await;

        let sent = h.recorder.sent();
        assert_eq!(sent.len(), 1);
        let open = &sent[0];
        assert_eq!(open.event_name, EventName::OpenNotebook);
        assert_eq!(open.seq(), 0);
        assert_eq!(
            open.cells,
            vec![CellMeta::new("c1", 0), CellMeta::new("c2", 1), CellMeta::new("c3", 2)]
        );
        assert_eq!(open.user_id, "student");
        assert_eq!(open.notebook_path, "course/lab1.ipynb");
        assert_eq!(open.snapshot.notebook["cells"][1]["source"], "b = 2");
        assert_eq!(open.snapshot.notebook["cells"][2]["cell_type"], "markdown");
    }

    #[tokio::test]
    async fn test_open_event_skipped_when_disabled() {
        let settings = all_enabled();
        settings.set_enabled(EVENT_SETTINGS_KEY, OpenNotebookSource::URN, false);
        let h = harness(settings);
        settle().await;

        assert!(h.recorder.sent().is_empty());
        assert!(!h.dispatcher.is_source_enabled(OpenNotebookSource::URN));
    }

    #[tokio::test]
    async fn test_save_sends_selected_cells_and_stubs_the_rest() {
        let h = harness(all_enabled());
        settle().await;

        let (_, c2) = h.notebook.find("c2").unwrap();
        c2.set_source("b = 3");
        h.notebook.select([c2.key()]);
        h.notebook.set_save_state(SaveState::Started);
        h.notebook.set_save_state(SaveState::Completed);
        settle().await;

        let sent = h.recorder.sent();
        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook, EventName::SaveNotebook]);
        let save = &sent[1];
        assert_eq!(save.seq(), 1);
        assert_eq!(save.cells, vec![CellMeta::new("c2", 1)]);
        assert_eq!(save.snapshot.notebook["cells"][0], json!({"id": "c1"}));
        assert_eq!(save.snapshot.notebook["cells"][1]["source"], "b = 3");
        assert_eq!(save.snapshot.notebook["cells"][2], json!({"id": "c3"}));
    }

    #[tokio::test]
    async fn test_cell_executed_only_for_own_notebook() {
        let h = harness(all_enabled());
        settle().await;

        let other = Notebook::new("other.ipynb", vec![Cell::code("x", "")]);
        h.host.report_executed(&other, other.cell_at(0).unwrap());

        let (_, c1) = h.notebook.find("c1").unwrap();
        c1.push_output(CellOutput::result("text/plain", json!("1")));
        h.host.report_executed(&h.notebook, Arc::clone(&c1));
        settle().await;

        let sent = h.recorder.sent();
        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook, EventName::CellExecuted]);
        assert_eq!(sent[1].cells, vec![CellMeta::new("c1", 0)]);
        assert_eq!(sent[1].snapshot.notebook["cells"][0]["outputs"][0]["data"]["text/plain"], "1");
    }

    #[tokio::test]
    async fn test_cell_executed_after_removal_is_dropped() {
        let h = harness(all_enabled());
        settle().await;

        let removed = h.notebook.remove_cell(0).unwrap();
        h.host.report_executed(&h.notebook, removed);
        settle().await;

        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook, EventName::RemoveCell]);
        assert_eq!(h.dispatcher.tracker().next_seq(), 2);
    }

    #[tokio::test]
    async fn test_add_remove_and_activate() {
        let h = harness(all_enabled());
        settle().await;

        h.notebook.insert_cell(1, Cell::code("new", "x"));
        h.notebook.activate(1);
        h.notebook.remove_cell(0);
        settle().await;

        let sent = h.recorder.sent();
        assert_eq!(
            names(&h.recorder),
            vec![
                EventName::OpenNotebook,
                EventName::AddCell,
                EventName::ActiveCellChanged,
                EventName::RemoveCell,
            ]
        );
        assert_eq!(sent[1].cells, vec![CellMeta::new("new", 1)]);
        assert_eq!(sent[1].snapshot.notebook["cells"][1]["source"], "x");
        assert_eq!(sent[2].cells, vec![CellMeta::new("new", 1)]);
        assert_eq!(sent[3].cells, vec![CellMeta::new("c1", 0)]);
        assert_eq!(sent[3].snapshot.notebook["cells"].as_array().unwrap().len(), 3);

        let seqs: Vec<u64> = sent.iter().map(|e| e.seq()).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_burst_collapses() {
        let h = harness(all_enabled());
        for (i, cell) in h.notebook.cells().iter().enumerate() {
            cell.set_extent(Extent::new(i as f64 * 300.0, 300.0));
        }
        h.notebook.set_viewport_height(250.0);
        settle().await;

        h.notebook.scroll_to(0.0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.notebook.scroll_to(200.0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.notebook.scroll_to(400.0);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook]);

        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;
        let sent = h.recorder.sent();
        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook, EventName::Scroll]);
        // Viewport 400..650 covers c2 (300..600) and c3 (600..900).
        assert_eq!(sent[1].cells, vec![CellMeta::new("c2", 1), CellMeta::new("c3", 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_scroll_drops_pending_evaluation() {
        let h = harness(all_enabled());
        settle().await;

        h.notebook.scroll_to(10.0);
        h.settings.set_enabled(EVENT_SETTINGS_KEY, ScrollSource::URN, false);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        settle().await;

        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook]);
    }

    #[tokio::test]
    async fn test_runtime_toggle_of_a_source() {
        let h = harness(all_enabled());
        settle().await;

        h.settings.set_enabled(EVENT_SETTINGS_KEY, crate::sources::AddCellSource::URN, false);
        h.notebook.insert_cell(0, Cell::code("quiet", ""));
        h.settings.set_enabled(EVENT_SETTINGS_KEY, crate::sources::AddCellSource::URN, true);
        h.notebook.insert_cell(0, Cell::code("loud", ""));
        settle().await;

        let sent = h.recorder.sent();
        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook, EventName::AddCell]);
        assert_eq!(sent[1].cells, vec![CellMeta::new("loud", 0)]);
    }

    #[tokio::test]
    async fn test_dispose_tears_down() {
        let h = harness(all_enabled());
        settle().await;

        h.notebook.dispose();
        assert!(h.dispatcher.is_closed());
        assert!(h.dispatcher.emitter().is_closed());
        assert_eq!(h.dispatcher.tracker().tracked(), 0);
        assert_eq!(h.settings.changed.handler_count(), 0);
        assert_eq!(h.notebook.cells_changed.handler_count(), 0);
        assert_eq!(h.notebook.disposed.handler_count(), 0);
        assert_eq!(h.host.executed.handler_count(), 0);

        h.notebook.insert_cell(0, Cell::code("late", ""));
        h.notebook.set_save_state(SaveState::Completed);
        settle().await;
        assert_eq!(names(&h.recorder), vec![EventName::OpenNotebook]);

        h.dispatcher.close();
    }

    #[tokio::test]
    async fn test_rename_shows_in_next_envelope() {
        let h = harness(all_enabled());
        settle().await;

        h.notebook.rename("course/lab1-final.ipynb");
        h.notebook.activate(0);
        settle().await;

        let sent = h.recorder.sent();
        assert_eq!(sent[1].notebook_path, "course/lab1-final.ipynb");
    }
}
