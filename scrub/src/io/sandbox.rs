//! Sandboxed execution of generated cleaning scripts.
//!
//! The [`Sandbox`] trait decouples the loop controller from the actual
//! execution backend (currently a subprocess interpreter). Tests use scripted
//! sandboxes that return predetermined outcomes without spawning processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::script::CleaningScript;
use crate::io::dataset::InputNotFoundError;
use crate::io::process::run_command_with_timeout;

/// Parameters for one sandbox invocation. Every call reserves its own output
/// path so a reader of the previous artifact never races a rewrite.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Script revision to execute.
    pub script: CleaningScript,
    /// Raw input dataset. Scripts always re-read the pristine input, never a
    /// previous cleaned output.
    pub input_path: PathBuf,
    /// Reserved output path for this call.
    pub output_path: PathBuf,
    /// Where to persist the script source before running it.
    pub script_path: PathBuf,
    /// Where to write the captured stdout/stderr log.
    pub log_path: PathBuf,
    /// Maximum wall-clock time for the script.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Outcome of one execution attempt. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The script exited cleanly and wrote the reserved output file.
    Succeeded { output_path: PathBuf },
    /// The script raised, timed out, or produced no output. The trace carries
    /// enough context (revision, input) to drive the next generation turn.
    Failed { trace: String },
}

/// Abstraction over script execution backends.
///
/// Determinism is not guaranteed: the script is arbitrary, externally
/// supplied text. The contract is "run it and faithfully report success or
/// the literal failure"; isolation beyond what the host process permits is a
/// deployment concern. Script-raised errors are returned as
/// [`ExecOutcome::Failed`]; `Err` is reserved for preconditions such as a
/// missing input file.
pub trait Sandbox {
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome>;
}

/// Sandbox that runs the script through a configurable interpreter argv as
/// `<interpreter...> <script> <input> <output>`.
pub struct InterpreterSandbox {
    interpreter: Vec<String>,
}

impl InterpreterSandbox {
    pub fn new(interpreter: Vec<String>) -> Self {
        Self { interpreter }
    }
}

impl Sandbox for InterpreterSandbox {
    #[instrument(skip_all, fields(revision = request.script.revision, timeout_secs = request.timeout.as_secs()))]
    fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        if !request.input_path.is_file() {
            return Err(InputNotFoundError {
                path: request.input_path.clone(),
            }
            .into());
        }

        for path in [&request.script_path, &request.output_path, &request.log_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
        }
        fs::write(&request.script_path, &request.script.source)
            .with_context(|| format!("write script {}", request.script_path.display()))?;

        info!(script = %request.script_path.display(), "executing cleaning script");
        let mut cmd = Command::new(&self.interpreter[0]);
        cmd.args(&self.interpreter[1..])
            .arg(&request.script_path)
            .arg(&request.input_path)
            .arg(&request.output_path);

        let output = run_command_with_timeout(
            cmd,
            None,
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run cleaning script")?;

        fs::write(&request.log_path, output.render("script"))
            .with_context(|| format!("write exec log {}", request.log_path.display()))?;

        let attempt = format!(
            "script revision {} on {}",
            request.script.revision,
            request.input_path.display()
        );
        if output.timed_out {
            warn!("cleaning script timed out");
            return Ok(ExecOutcome::Failed {
                trace: format!("{attempt}: timed out after {:?}", request.timeout),
            });
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "cleaning script failed");
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ExecOutcome::Failed {
                trace: format!(
                    "{attempt}: exited with status {:?}\n{}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }
        if !request.output_path.is_file() {
            return Ok(ExecOutcome::Failed {
                trace: format!(
                    "{attempt}: exited cleanly but wrote no output at {}",
                    request.output_path.display()
                ),
            });
        }

        debug!(output = %request.output_path.display(), "cleaning script succeeded");
        Ok(ExecOutcome::Succeeded {
            output_path: request.output_path.clone(),
        })
    }
}

/// Promote a per-call output into the fixed, well-known location. Atomic:
/// written to a temp file first, then renamed, so an attached reader never
/// sees a torn file. Only the latest output is retained there.
pub fn promote_output(from: &std::path::Path, to: &std::path::Path) -> Result<()> {
    let contents =
        fs::read(from).with_context(|| format!("read cleaned output {}", from.display()))?;
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp = to.with_extension("jsonl.tmp");
    fs::write(&tmp, contents).with_context(|| format!("write temp output {}", tmp.display()))?;
    fs::rename(&tmp, to).with_context(|| format!("replace output {}", to.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    // Tests use `sh` as the interpreter so they stay hermetic: the "script"
    // is shell text, which the sandbox treats as opaquely as any other.
    fn request(dir: &Path, source: &str, timeout: Duration) -> ExecRequest {
        ExecRequest {
            script: CleaningScript::initial(source),
            input_path: dir.join("input.jsonl"),
            output_path: dir.join("cleaned.jsonl"),
            script_path: dir.join("script.sh"),
            log_path: dir.join("exec.log"),
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn successful_script_yields_output_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("input.jsonl"), "{\"a\":1}\n").expect("write input");

        let sandbox = InterpreterSandbox::new(vec!["sh".to_string()]);
        let req = request(temp.path(), "cp \"$1\" \"$2\"\n", Duration::from_secs(5));

        let outcome = sandbox.execute(&req).expect("execute");
        assert_eq!(
            outcome,
            ExecOutcome::Succeeded {
                output_path: temp.path().join("cleaned.jsonl")
            }
        );
        assert!(temp.path().join("exec.log").is_file());
    }

    #[test]
    fn raising_script_is_failure_not_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("input.jsonl"), "{\"a\":1}\n").expect("write input");

        let sandbox = InterpreterSandbox::new(vec!["sh".to_string()]);
        let req = request(
            temp.path(),
            "echo 'KeyError: name' >&2; exit 1\n",
            Duration::from_secs(5),
        );

        let outcome = sandbox.execute(&req).expect("execute");
        match outcome {
            ExecOutcome::Failed { trace } => {
                assert!(trace.contains("script revision 1"), "{trace}");
                assert!(trace.contains("KeyError: name"), "{trace}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn silent_script_without_output_is_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("input.jsonl"), "{\"a\":1}\n").expect("write input");

        let sandbox = InterpreterSandbox::new(vec!["sh".to_string()]);
        let req = request(temp.path(), "true\n", Duration::from_secs(5));

        let outcome = sandbox.execute(&req).expect("execute");
        match outcome {
            ExecOutcome::Failed { trace } => assert!(trace.contains("wrote no output"), "{trace}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn timeout_is_failure_with_budget_in_trace() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("input.jsonl"), "{\"a\":1}\n").expect("write input");

        let sandbox = InterpreterSandbox::new(vec!["sh".to_string()]);
        let req = request(temp.path(), "sleep 30\n", Duration::from_millis(100));

        let outcome = sandbox.execute(&req).expect("execute");
        match outcome {
            ExecOutcome::Failed { trace } => assert!(trace.contains("timed out"), "{trace}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_input_is_a_precondition_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = InterpreterSandbox::new(vec!["sh".to_string()]);
        let req = request(temp.path(), "cp \"$1\" \"$2\"\n", Duration::from_secs(5));

        let err = sandbox.execute(&req).unwrap_err();
        assert!(err.downcast_ref::<InputNotFoundError>().is_some());
    }

    #[test]
    fn promote_replaces_well_known_output_atomically() {
        let temp = tempfile::tempdir().expect("tempdir");
        let from = temp.path().join("turn-output.jsonl");
        let to = temp.path().join("cleaned_output.jsonl");
        fs::write(&from, "{\"a\":1}\n").expect("write");
        fs::write(&to, "stale\n").expect("write stale");

        promote_output(&from, &to).expect("promote");
        assert_eq!(fs::read_to_string(&to).expect("read"), "{\"a\":1}\n");
        assert!(from.is_file(), "per-call output must remain reserved");
    }
}
