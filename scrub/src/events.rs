//! Progress event contract between the loop controller and observers.
//!
//! Sinks are constructed and injected per run; there is no process-wide
//! reporter. Emission is infallible from the controller's point of view: a
//! sink that cannot deliver an event drops it, never aborts the run.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Role of an external oracle invoked by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Inspector,
    Generator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Inspector => "inspector",
            Role::Generator => "generator",
        }
    }
}

/// Terminal state of a run, as reported in the final event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    /// Inspection passed.
    Valid,
    /// Turn budget reached without passing.
    Exhausted,
    /// Unrecoverable infrastructure failure or cancellation.
    Aborted,
}

/// One progress event. Events are emitted before the action they describe is
/// issued, so a crash mid-turn still leaves an observable trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    TurnStarted {
        turn: u32,
    },
    RoleInvoked {
        role: Role,
        summary: String,
    },
    ToolInvoked {
        name: String,
    },
    ToolCompleted {
        name: String,
        summary: String,
    },
    RunTerminated {
        state: TerminalState,
        turns_taken: u32,
    },
}

/// An event tagged with the run it belongs to, so interleaved emission from
/// concurrent runs stays attributable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Observer sink for run events.
///
/// Implementations must be safe for concurrent emission from multiple runs
/// and must not propagate delivery failures.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RunEvent);
}

/// Sink that discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RunEvent) {}
}

/// Sink that forwards events to `tracing` at info level.
pub struct TraceSink;

impl EventSink for TraceSink {
    fn emit(&self, event: &RunEvent) {
        match &event.kind {
            EventKind::TurnStarted { turn } => {
                info!(run_id = %event.run_id, turn, "turn started");
            }
            EventKind::RoleInvoked { role, summary } => {
                info!(run_id = %event.run_id, role = role.as_str(), %summary, "role invoked");
            }
            EventKind::ToolInvoked { name } => {
                info!(run_id = %event.run_id, tool = %name, "tool invoked");
            }
            EventKind::ToolCompleted { name, summary } => {
                info!(run_id = %event.run_id, tool = %name, %summary, "tool completed");
            }
            EventKind::RunTerminated { state, turns_taken } => {
                info!(run_id = %event.run_id, ?state, turns_taken, "run terminated");
            }
        }
    }
}

/// Per-run emitter that stamps every event with the run id.
pub struct Reporter<'a> {
    run_id: String,
    sink: &'a dyn EventSink,
}

impl<'a> Reporter<'a> {
    pub fn new(run_id: impl Into<String>, sink: &'a dyn EventSink) -> Self {
        Self {
            run_id: run_id.into(),
            sink,
        }
    }

    pub fn emit(&self, kind: EventKind) {
        self.sink.emit(&RunEvent {
            run_id: self.run_id.clone(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Guards the wire format consumed by the SSE feed: changes here break
    /// attached display layers.
    #[test]
    fn events_serialize_with_stable_tags() {
        let event = RunEvent {
            run_id: "run-1".to_string(),
            kind: EventKind::RunTerminated {
                state: TerminalState::Valid,
                turns_taken: 2,
            },
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["type"], "run_terminated");
        assert_eq!(json["state"], "valid");
        assert_eq!(json["turns_taken"], 2);
    }

    #[test]
    fn role_invoked_round_trips() {
        let event = RunEvent {
            run_id: "run-2".to_string(),
            kind: EventKind::RoleInvoked {
                role: Role::Generator,
                summary: "revise script".to_string(),
            },
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: RunEvent = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, event);
    }

    #[test]
    fn reporter_tags_events_with_run_id() {
        use std::sync::Mutex;

        struct Capture(Mutex<Vec<RunEvent>>);
        impl EventSink for Capture {
            fn emit(&self, event: &RunEvent) {
                self.0.lock().expect("lock").push(event.clone());
            }
        }

        let sink = Capture(Mutex::new(Vec::new()));
        let reporter = Reporter::new("run-9", &sink);
        reporter.emit(EventKind::TurnStarted { turn: 0 });

        let events = sink.0.into_inner().expect("into_inner");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, "run-9");
    }
}
