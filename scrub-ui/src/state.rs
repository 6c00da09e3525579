//! Shared application state for the UI server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use scrub::events::{EventSink, RunEvent};

/// Registry entry for one launched run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: String,
    pub file: String,
    /// "running", "valid", "exhausted", or "aborted".
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turns_taken: Option<u32>,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Directory scanned for input `.jsonl` files.
    pub data_dir: PathBuf,
    /// Base directory; each run gets its own workspace beneath it.
    pub workdir: PathBuf,
    /// Broadcast sender feeding the SSE stream. The only resource shared
    /// between concurrent runs.
    pub event_tx: Arc<broadcast::Sender<RunEvent>>,
    /// In-memory run registry.
    pub runs: Arc<RwLock<HashMap<String, RunStatus>>>,
}

impl AppState {
    pub fn new(data_dir: PathBuf, workdir: PathBuf) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            data_dir,
            workdir,
            event_tx: Arc::new(event_tx),
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Workspace owned by a single run. Runs never share artifact state or
    /// an output path, so each gets its own directory.
    pub fn run_workdir(&self, run_id: &str) -> PathBuf {
        self.workdir.join(run_id)
    }

    pub fn register_run(&self, status: RunStatus) {
        if let Ok(mut runs) = self.runs.write() {
            runs.insert(status.run_id.clone(), status);
        }
    }

    pub fn finish_run(&self, run_id: &str, state: &str, turns_taken: Option<u32>) {
        if let Ok(mut runs) = self.runs.write()
            && let Some(status) = runs.get_mut(run_id)
        {
            status.state = state.to_string();
            status.turns_taken = turns_taken;
        }
    }
}

/// Event sink that forwards run events into the broadcast channel.
///
/// Send failures (no subscribers) are dropped: observability never aborts a
/// run.
pub struct BroadcastSink {
    tx: broadcast::Sender<RunEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &RunEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrub::events::EventKind;

    #[tokio::test]
    async fn broadcast_sink_reaches_subscribers() {
        let state = AppState::new(PathBuf::from("data"), PathBuf::from("work"));
        let mut rx = state.event_tx.subscribe();

        let sink = BroadcastSink::new(state.event_tx.as_ref().clone());
        sink.emit(&RunEvent {
            run_id: "run-1".to_string(),
            kind: EventKind::TurnStarted { turn: 0 },
        });

        let event = rx.recv().await.expect("recv");
        assert_eq!(event.run_id, "run-1");
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let state = AppState::new(PathBuf::from("data"), PathBuf::from("work"));
        let sink = BroadcastSink::new(state.event_tx.as_ref().clone());
        sink.emit(&RunEvent {
            run_id: "run-1".to_string(),
            kind: EventKind::TurnStarted { turn: 0 },
        });
    }

    #[test]
    fn finish_run_updates_registry() {
        let state = AppState::new(PathBuf::from("data"), PathBuf::from("work"));
        state.register_run(RunStatus {
            run_id: "run-1".to_string(),
            file: "a.jsonl".to_string(),
            state: "running".to_string(),
            turns_taken: None,
        });
        state.finish_run("run-1", "valid", Some(2));

        let runs = state.runs.read().expect("read");
        let status = runs.get("run-1").expect("status");
        assert_eq!(status.state, "valid");
        assert_eq!(status.turns_taken, Some(2));
    }
}
