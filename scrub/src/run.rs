//! Repair loop controller.
//!
//! Owns the run state machine: sequences inspector and generator calls,
//! routes scripts to the sandbox, enforces the turn budget, and decides
//! termination. Every transition is reported to the event sink before the
//! corresponding oracle or sandbox call is issued, so a crash mid-turn still
//! leaves an observable trail of what was attempted.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::report::IssueReport;
use crate::core::state::TurnState;
use crate::events::{EventKind, EventSink, Reporter, Role, TerminalState};
use crate::io::config::ScrubConfig;
use crate::io::dataset::InputNotFoundError;
use crate::io::oracle::{Generator, Inspector};
use crate::io::paths::ScrubPaths;
use crate::io::sandbox::{ExecOutcome, ExecRequest, Sandbox, promote_output};
use crate::io::turn_log::{TurnMeta, TurnPaths, write_turn};

/// Tool name reported for sandbox executions.
pub const EXECUTE_TOOL: &str = "execute_script";

/// Cooperative cancellation flag shared with the caller.
///
/// A cancelled run stops at the next between-turns checkpoint; an in-flight
/// sandbox or oracle call is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Parameters for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Identifier for this run; tag for events and turn directories.
    pub run_id: String,
    /// Raw input dataset. Never mutated; every attempt re-reads it.
    pub input_path: PathBuf,
    /// Directory owning `.scrub/` state and the well-known output location.
    pub workdir: PathBuf,
    /// Lines handed to the inspector per evaluation.
    pub preview_lines: usize,
    /// Maximum number of Generate+Execute attempts.
    pub max_turns: u32,
}

/// Collaborators the controller drives. Each run owns its own artifact state;
/// the only resource shared between concurrent runs is the event sink.
pub struct LoopDeps<'a, I: Inspector, G: Generator, S: Sandbox> {
    pub inspector: &'a I,
    pub generator: &'a G,
    pub sandbox: &'a S,
    pub config: &'a ScrubConfig,
}

/// Reason the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Inspection passed.
    Valid,
    /// Turn budget reached without passing.
    Exhausted { max_turns: u32 },
    /// Unrecoverable infrastructure failure or cancellation.
    Aborted { reason: String },
}

impl LoopStop {
    pub fn terminal_state(&self) -> TerminalState {
        match self {
            LoopStop::Valid => TerminalState::Valid,
            LoopStop::Exhausted { .. } => TerminalState::Exhausted,
            LoopStop::Aborted { .. } => TerminalState::Aborted,
        }
    }
}

/// Report and result of one Generate+Execute attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub issues: Vec<String>,
    pub failure: Option<String>,
    pub script_revision: u32,
    /// Cleaned artifact written by this attempt, absent when it failed.
    pub artifact: Option<PathBuf>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub run_id: String,
    pub stop: LoopStop,
    pub turns_taken: u32,
    pub generator_calls: u32,
    pub executor_calls: u32,
    /// Last artifact on `Valid`/`Exhausted`; absent on `Aborted`.
    pub final_path: Option<PathBuf>,
    pub history: Vec<TurnRecord>,
}

/// Drive the repair loop until the dataset passes inspection, the turn
/// budget is exhausted, or an unrecoverable failure aborts the run.
///
/// Returns `Err` only when the input dataset does not exist; the run never
/// starts and no events are emitted. All other failures are absorbed into
/// the outcome: script errors feed the next generation turn, oracle and
/// host failures terminate the run as `Aborted`.
///
/// Turn accounting: each Generate+Execute attempt consumes one budget unit,
/// whether it succeeds or fails. A run whose raw input passes immediately
/// reports zero turns; a run repaired after `n` attempts reports the final
/// confirming inspection as a turn of its own (capped at the budget).
#[instrument(skip_all, fields(run_id = %request.run_id, max_turns = request.max_turns))]
pub fn run_repair_loop<I: Inspector, G: Generator, S: Sandbox>(
    deps: &LoopDeps<'_, I, G, S>,
    request: &RunRequest,
    sink: &dyn EventSink,
    cancel: &CancelToken,
) -> Result<LoopOutcome> {
    if !request.input_path.is_file() {
        return Err(InputNotFoundError {
            path: request.input_path.clone(),
        }
        .into());
    }

    info!(input = %request.input_path.display(), "run starting");
    let paths = ScrubPaths::new(&request.workdir);
    let reporter = Reporter::new(request.run_id.clone(), sink);
    let mut state = TurnState::initial(request.input_path.clone());
    let mut attempts = 0u32;
    let mut cycle = 0u32;
    let mut generator_calls = 0u32;
    let mut executor_calls = 0u32;
    let mut history: Vec<TurnRecord> = Vec::new();

    loop {
        if cancel.is_cancelled() {
            warn!("run cancelled at turn checkpoint");
            let stop = LoopStop::Aborted {
                reason: "cancelled".to_string(),
            };
            return Ok(terminate(
                &reporter, request, stop, attempts, generator_calls, executor_calls, None, history,
            ));
        }

        reporter.emit(EventKind::TurnStarted { turn: cycle });

        // An execution failure takes precedence over quality issues: its
        // trace becomes the whole report and inspection is skipped, since
        // there is no valid artifact to inspect.
        let report = match state.last_failure.take() {
            Some(trace) => IssueReport::from_failure(trace),
            None => {
                reporter.emit(EventKind::RoleInvoked {
                    role: Role::Inspector,
                    summary: format!("inspect {}", state.artifact_path.display()),
                });
                match deps.inspector.inspect(&state.artifact_path, request.preview_lines) {
                    Ok(report) => report,
                    Err(err) => {
                        let stop = aborted(Role::Inspector, cycle, &err);
                        return Ok(terminate(
                            &reporter,
                            request,
                            stop,
                            attempts,
                            generator_calls,
                            executor_calls,
                            None,
                            history,
                        ));
                    }
                }
            }
        };

        if report.is_clean() {
            let turns_taken = if attempts == 0 {
                0
            } else {
                (attempts + 1).min(request.max_turns)
            };
            info!(turns_taken, "dataset valid");
            return Ok(terminate(
                &reporter,
                request,
                LoopStop::Valid,
                turns_taken,
                generator_calls,
                executor_calls,
                Some(state.artifact_path.clone()),
                history,
            ));
        }

        if attempts == request.max_turns {
            info!(attempts, "turn budget exhausted");
            let stop = LoopStop::Exhausted {
                max_turns: request.max_turns,
            };
            return Ok(terminate(
                &reporter,
                request,
                stop,
                attempts,
                generator_calls,
                executor_calls,
                Some(state.artifact_path.clone()),
                history,
            ));
        }

        attempts += 1;
        let started = Instant::now();
        let turn_paths = TurnPaths::new(&paths.runs_dir, &request.run_id, attempts);

        reporter.emit(EventKind::RoleInvoked {
            role: Role::Generator,
            summary: format!("revise script for {}", report.summary()),
        });
        let script = match deps
            .generator
            .generate(&report, state.script.as_ref(), &request.input_path)
        {
            Ok(script) => script,
            Err(err) => {
                let stop = aborted(Role::Generator, cycle, &err);
                return Ok(terminate(
                    &reporter,
                    request,
                    stop,
                    attempts,
                    generator_calls,
                    executor_calls,
                    None,
                    history,
                ));
            }
        };
        generator_calls += 1;
        state.replace_script(script.clone());

        let exec_request = ExecRequest {
            script,
            // Always the pristine raw input: scripts are cumulative full
            // rewrites, never patches over lossy intermediates.
            input_path: request.input_path.clone(),
            output_path: turn_paths.output_path.clone(),
            script_path: turn_paths.script_path.clone(),
            log_path: turn_paths.log_path.clone(),
            timeout: Duration::from_secs(deps.config.turn_timeout_secs),
            output_limit_bytes: deps.config.output_limit_bytes,
        };

        reporter.emit(EventKind::ToolInvoked {
            name: EXECUTE_TOOL.to_string(),
        });
        executor_calls += 1;
        let exec_result = deps.sandbox.execute(&exec_request);
        let revision = exec_request.script.revision;

        let (outcome_label, artifact) = match exec_result {
            Ok(ExecOutcome::Succeeded { output_path }) => {
                if let Err(err) = promote_output(&output_path, &paths.output_path) {
                    let stop = LoopStop::Aborted {
                        reason: format!("promote cleaned output: {err:#}"),
                    };
                    return Ok(terminate(
                        &reporter,
                        request,
                        stop,
                        attempts,
                        generator_calls,
                        executor_calls,
                        None,
                        history,
                    ));
                }
                reporter.emit(EventKind::ToolCompleted {
                    name: EXECUTE_TOOL.to_string(),
                    summary: format!("wrote {}", output_path.display()),
                });
                state.record_success(output_path.clone());
                ("succeeded", Some(output_path))
            }
            Ok(ExecOutcome::Failed { trace }) => {
                reporter.emit(EventKind::ToolCompleted {
                    name: EXECUTE_TOOL.to_string(),
                    summary: "execution failed".to_string(),
                });
                state.record_failure(trace);
                ("failed", None)
            }
            Err(err) => {
                // Preconditions under the sandbox (input vanished mid-run)
                // are infrastructure failures, not script failures.
                let stop = LoopStop::Aborted {
                    reason: format!("executor: {err:#}"),
                };
                return Ok(terminate(
                    &reporter,
                    request,
                    stop,
                    attempts,
                    generator_calls,
                    executor_calls,
                    None,
                    history,
                ));
            }
        };

        let meta = TurnMeta {
            run_id: request.run_id.clone(),
            turn: attempts,
            script_revision: revision,
            outcome: outcome_label.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if let Err(err) = write_turn(&turn_paths, &meta, &report) {
            let stop = LoopStop::Aborted {
                reason: format!("persist turn artifacts: {err:#}"),
            };
            return Ok(terminate(
                &reporter,
                request,
                stop,
                attempts,
                generator_calls,
                executor_calls,
                None,
                history,
            ));
        }

        history.push(TurnRecord {
            turn: attempts,
            issues: report.issues,
            failure: report.failure,
            script_revision: revision,
            artifact,
        });
        cycle += 1;
    }
}

fn aborted(role: Role, cycle: u32, err: &anyhow::Error) -> LoopStop {
    warn!(role = role.as_str(), cycle, err = %format!("{err:#}"), "oracle unreachable");
    LoopStop::Aborted {
        reason: format!("{} oracle failed at turn {}: {err:#}", role.as_str(), cycle),
    }
}

#[allow(clippy::too_many_arguments)]
fn terminate(
    reporter: &Reporter<'_>,
    request: &RunRequest,
    stop: LoopStop,
    turns_taken: u32,
    generator_calls: u32,
    executor_calls: u32,
    final_path: Option<PathBuf>,
    history: Vec<TurnRecord>,
) -> LoopOutcome {
    reporter.emit(EventKind::RunTerminated {
        state: stop.terminal_state(),
        turns_taken,
    });
    LoopOutcome {
        run_id: request.run_id.clone(),
        stop,
        turns_taken,
        generator_calls,
        executor_calls,
        final_path,
        history,
    }
}
