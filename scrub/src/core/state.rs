//! Per-run artifact state threaded through turns.

use std::path::PathBuf;

use crate::core::script::CleaningScript;

/// The evolving (artifact path, script, last failure) tuple for one run.
///
/// The raw input is never mutated; `artifact_path` points at the input until
/// the first successful execution, then at the latest cleaned output. A
/// pending failure trace suppresses inspection for the next turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnState {
    /// Path of the artifact the next inspection will evaluate.
    pub artifact_path: PathBuf,
    /// Most recent script revision, absent before the first generator call.
    pub script: Option<CleaningScript>,
    /// Trace from a failed execution, consumed by the next turn.
    pub last_failure: Option<String>,
}

impl TurnState {
    /// State at the start of a run: raw input, no script, no failure.
    pub fn initial(input_path: PathBuf) -> Self {
        Self {
            artifact_path: input_path,
            script: None,
            last_failure: None,
        }
    }

    /// Record a successful execution: the new artifact becomes current and
    /// any stale failure is cleared.
    pub fn record_success(&mut self, output_path: PathBuf) {
        self.artifact_path = output_path;
        self.last_failure = None;
    }

    /// Record a failed execution. The artifact path is left untouched, since there
    /// is no valid new artifact to inspect.
    pub fn record_failure(&mut self, trace: String) {
        self.last_failure = Some(trace);
    }

    /// Install a freshly generated script revision.
    pub fn replace_script(&mut self, script: CleaningScript) {
        self.script = Some(script);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_clears_pending_failure() {
        let mut state = TurnState::initial(PathBuf::from("raw.jsonl"));
        state.record_failure("boom".to_string());
        state.record_success(PathBuf::from("clean.jsonl"));
        assert_eq!(state.artifact_path, PathBuf::from("clean.jsonl"));
        assert!(state.last_failure.is_none());
    }

    #[test]
    fn failure_keeps_previous_artifact() {
        let mut state = TurnState::initial(PathBuf::from("raw.jsonl"));
        state.record_failure("trace".to_string());
        assert_eq!(state.artifact_path, PathBuf::from("raw.jsonl"));
        assert_eq!(state.last_failure.as_deref(), Some("trace"));
    }

    #[test]
    fn script_survives_failure() {
        let mut state = TurnState::initial(PathBuf::from("raw.jsonl"));
        state.replace_script(CleaningScript::initial("pass"));
        state.record_failure("trace".to_string());
        assert_eq!(state.script.as_ref().map(|s| s.revision), Some(1));
    }
}
