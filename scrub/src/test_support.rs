//! Test-only scripted doubles for oracles, the sandbox, and the event sink.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::core::report::IssueReport;
use crate::core::script::CleaningScript;
use crate::events::{EventSink, RunEvent};
use crate::io::oracle::{Generator, Inspector, OracleUnreachableError};
use crate::io::sandbox::{ExecOutcome, ExecRequest, Sandbox};

/// Inspector that replays a fixed sequence of reports, then panics if called
/// again (tests must script exactly the calls they expect).
pub struct ScriptedInspector {
    reports: Mutex<Vec<IssueReport>>,
    calls: Mutex<u32>,
}

impl ScriptedInspector {
    pub fn new(reports: Vec<IssueReport>) -> Self {
        Self {
            reports: Mutex::new(reports),
            calls: Mutex::new(0),
        }
    }

    /// Inspector that always passes.
    pub fn always_clean() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().expect("lock")
    }
}

impl Inspector for ScriptedInspector {
    fn inspect(&self, _dataset_path: &Path, _preview_lines: usize) -> Result<IssueReport> {
        *self.calls.lock().expect("lock") += 1;
        let mut reports = self.reports.lock().expect("lock");
        if reports.is_empty() {
            return Ok(IssueReport::clean());
        }
        Ok(reports.remove(0))
    }
}

/// Inspector whose backend is unreachable.
pub struct UnreachableInspector;

impl Inspector for UnreachableInspector {
    fn inspect(&self, _dataset_path: &Path, _preview_lines: usize) -> Result<IssueReport> {
        Err(OracleUnreachableError {
            role: crate::events::Role::Inspector,
            detail: "connection refused".to_string(),
        }
        .into())
    }
}

/// Generator that returns a fixed script source on every call and records
/// the reports it was handed.
pub struct ScriptedGenerator {
    source: String,
    pub received: Mutex<Vec<IssueReport>>,
    pub previous_revisions: Mutex<Vec<Option<u32>>>,
}

impl ScriptedGenerator {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            received: Mutex::new(Vec::new()),
            previous_revisions: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.received.lock().expect("lock").len() as u32
    }
}

impl Generator for ScriptedGenerator {
    fn generate(
        &self,
        issues: &IssueReport,
        previous: Option<&CleaningScript>,
        _input_path: &Path,
    ) -> Result<CleaningScript> {
        self.received.lock().expect("lock").push(issues.clone());
        self.previous_revisions
            .lock()
            .expect("lock")
            .push(previous.map(|s| s.revision));
        Ok(match previous {
            Some(prev) => prev.revised(self.source.clone()),
            None => CleaningScript::initial(self.source.clone()),
        })
    }
}

/// Generator whose backend is unreachable.
pub struct UnreachableGenerator;

impl Generator for UnreachableGenerator {
    fn generate(
        &self,
        _issues: &IssueReport,
        _previous: Option<&CleaningScript>,
        _input_path: &Path,
    ) -> Result<CleaningScript> {
        Err(OracleUnreachableError {
            role: crate::events::Role::Generator,
            detail: "connection refused".to_string(),
        }
        .into())
    }
}

/// One scripted execution outcome.
#[derive(Debug, Clone)]
pub enum ScriptedExec {
    /// Write `contents` to the reserved output path and succeed.
    Succeed { contents: String },
    /// Fail with the given trace.
    Fail { trace: String },
}

/// Sandbox that replays a fixed sequence of outcomes without spawning
/// processes. Replays the last outcome forever once the sequence is drained.
pub struct ScriptedSandbox {
    outcomes: Mutex<Vec<ScriptedExec>>,
    calls: Mutex<u32>,
}

impl ScriptedSandbox {
    pub fn new(outcomes: Vec<ScriptedExec>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: Mutex::new(0),
        }
    }

    /// Sandbox that always copies the input to the output.
    pub fn always_succeeding() -> Self {
        Self::new(vec![ScriptedExec::Succeed {
            contents: "{\"ok\":true}\n".to_string(),
        }])
    }

    /// Sandbox that always fails with the same trace.
    pub fn always_failing(trace: impl Into<String>) -> Self {
        Self::new(vec![ScriptedExec::Fail {
            trace: trace.into(),
        }])
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().expect("lock")
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        *self.calls.lock().expect("lock") += 1;
        let mut outcomes = self.outcomes.lock().expect("lock");
        let outcome = if outcomes.len() > 1 {
            outcomes.remove(0)
        } else {
            outcomes
                .first()
                .cloned()
                .ok_or_else(|| anyhow!("scripted sandbox has no outcomes"))?
        };
        match outcome {
            ScriptedExec::Succeed { contents } => {
                if let Some(parent) = request.output_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&request.output_path, contents)?;
                Ok(ExecOutcome::Succeeded {
                    output_path: request.output_path.clone(),
                })
            }
            ScriptedExec::Fail { trace } => Ok(ExecOutcome::Failed { trace }),
        }
    }
}

/// Sink that records every event for assertions.
#[derive(Default)]
pub struct CollectingSink(Mutex<Vec<RunEvent>>);

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.0.lock().expect("lock").clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &RunEvent) {
        self.0.lock().expect("lock").push(event.clone());
    }
}

/// Write a small mixed-quality dataset and return its path.
pub fn sample_dataset(dir: &Path) -> PathBuf {
    let path = dir.join("raw.jsonl");
    fs::write(
        &path,
        "{\"Name\": \"Ada\", \"note\": \"<b>hi</b>\"}\n{\"name\": null}\n",
    )
    .expect("write sample dataset");
    path
}
