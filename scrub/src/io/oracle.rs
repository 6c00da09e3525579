//! Oracle interfaces and their process-backed implementations.
//!
//! The [`Inspector`] and [`Generator`] traits are the contracts the loop
//! controller consumes; the semantic judgment behind them lives outside this
//! crate. The shipped implementations delegate to an agent CLI (`codex exec`)
//! with schema-constrained output. Tests use scripted oracles that return
//! predetermined reports without spawning processes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use minijinja::{Environment, context};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::report::IssueReport;
use crate::core::script::CleaningScript;
use crate::events::Role;
use crate::io::config::ScrubConfig;
use crate::io::dataset;
use crate::io::process::run_command_with_timeout;

const INSPECTOR_TEMPLATE: &str = include_str!("prompts/inspector.md");
const GENERATOR_TEMPLATE: &str = include_str!("prompts/generator.md");
const ISSUE_REPORT_SCHEMA: &str = include_str!("../../schemas/issue_report.schema.json");
const CLEANING_SCRIPT_SCHEMA: &str = include_str!("../../schemas/cleaning_script.schema.json");

/// Evaluates a dataset against the quality rule set.
///
/// Must be callable repeatedly and cheaply; the controller retains no oracle
/// state between calls, so any memory of prior turns is passed explicitly.
pub trait Inspector {
    fn inspect(&self, dataset_path: &Path, preview_lines: usize) -> Result<IssueReport>;
}

/// Produces or revises the cleaning script for a reported set of issues.
///
/// Behavioral contract (not enforced at runtime): the returned script must be
/// complete and self-contained (never a diff), and implementations should
/// incrementally edit `previous` rather than discard its passing logic. The
/// controller upholds its side by always handing back the latest revision.
pub trait Generator {
    fn generate(
        &self,
        issues: &IssueReport,
        previous: Option<&CleaningScript>,
        input_path: &Path,
    ) -> Result<CleaningScript>;
}

/// An oracle could not be reached or produced an unusable reply. Fatal at the
/// point encountered: the run transitions to its aborted state.
#[derive(Debug)]
pub struct OracleUnreachableError {
    pub role: Role,
    pub detail: String,
}

impl fmt::Display for OracleUnreachableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} oracle unreachable: {}", self.role.as_str(), self.detail)
    }
}

impl std::error::Error for OracleUnreachableError {}

/// Shared subprocess plumbing for the codex-backed oracles.
struct OracleProcess {
    command: Vec<String>,
    scratch_dir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    calls: AtomicU64,
}

impl OracleProcess {
    fn new(config: &ScrubConfig, scratch_dir: PathBuf) -> Self {
        Self {
            command: config.oracle.command.clone(),
            scratch_dir,
            timeout: Duration::from_secs(config.oracle_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            calls: AtomicU64::new(0),
        }
    }

    /// Run the agent CLI with a schema-constrained reply and return the
    /// parsed, schema-validated JSON.
    #[instrument(skip_all, fields(label = label, role = role.as_str()))]
    fn invoke(&self, role: Role, label: &str, prompt: &str, schema: &str) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        fs::create_dir_all(&self.scratch_dir)
            .with_context(|| format!("create oracle dir {}", self.scratch_dir.display()))?;
        let schema_path = self.scratch_dir.join(format!("{label}.schema.json"));
        let reply_path = self.scratch_dir.join(format!("{label}-{call}.json"));
        fs::write(&schema_path, schema)
            .with_context(|| format!("write schema {}", schema_path.display()))?;

        info!(command = %self.command[0], label, "invoking oracle");
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg("--output-schema")
            .arg(&schema_path)
            .arg("--output-last-message")
            .arg(&reply_path)
            .arg("-");

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| unreachable_err(role, format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "oracle timed out");
            return Err(unreachable_err(
                role,
                format!("timed out after {:?}", self.timeout),
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "oracle command failed");
            return Err(unreachable_err(
                role,
                format!(
                    "exited with status {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let contents = fs::read_to_string(&reply_path)
            .map_err(|err| unreachable_err(role, format!("missing reply {}: {err}", reply_path.display())))?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|err| unreachable_err(role, format!("reply is not JSON: {err}")))?;
        validate_against_schema(&value, schema)
            .map_err(|err| unreachable_err(role, format!("reply violates schema: {err:#}")))?;
        debug!("oracle reply validated");
        Ok(value)
    }
}

fn unreachable_err(role: Role, detail: String) -> anyhow::Error {
    OracleUnreachableError { role, detail }.into()
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_against_schema(instance: &Value, schema_raw: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_raw).context("parse schema json")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!("schema validation failed:\n- {}", messages.join("\n- ")));
    }
    Ok(())
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("inspector", INSPECTOR_TEMPLATE)
            .expect("inspector template should be valid");
        env.add_template("generator", GENERATOR_TEMPLATE)
            .expect("generator template should be valid");
        Self { env }
    }
}

/// Inspector backed by the agent CLI.
pub struct CodexInspector {
    process: OracleProcess,
    engine: PromptEngine,
}

impl CodexInspector {
    pub fn new(config: &ScrubConfig, scratch_dir: PathBuf) -> Self {
        Self {
            process: OracleProcess::new(config, scratch_dir),
            engine: PromptEngine::new(),
        }
    }
}

impl Inspector for CodexInspector {
    fn inspect(&self, dataset_path: &Path, preview_lines: usize) -> Result<IssueReport> {
        // Malformed lines are surfaced inside the preview text, so they reach
        // the oracle as data to judge rather than failing the call.
        let preview = dataset::preview(dataset_path, preview_lines)?;
        let record_count = dataset::count_records(dataset_path)?;

        let template = self
            .engine
            .env
            .get_template("inspector")
            .context("load inspector template")?;
        let prompt = template
            .render(context! {
                dataset_path => dataset_path.display().to_string(),
                preview => preview,
                preview_lines => preview_lines,
                record_count => record_count,
            })
            .context("render inspector prompt")?;

        let value = self
            .process
            .invoke(Role::Inspector, "inspect", &prompt, ISSUE_REPORT_SCHEMA)?;
        let report: IssueReport = serde_json::from_value(value)
            .map_err(|err| unreachable_err(Role::Inspector, format!("reply shape: {err}")))?;
        Ok(report)
    }
}

/// Generator backed by the agent CLI.
pub struct CodexGenerator {
    process: OracleProcess,
    engine: PromptEngine,
}

impl CodexGenerator {
    pub fn new(config: &ScrubConfig, scratch_dir: PathBuf) -> Self {
        Self {
            process: OracleProcess::new(config, scratch_dir),
            engine: PromptEngine::new(),
        }
    }
}

impl Generator for CodexGenerator {
    fn generate(
        &self,
        issues: &IssueReport,
        previous: Option<&CleaningScript>,
        input_path: &Path,
    ) -> Result<CleaningScript> {
        let template = self
            .engine
            .env
            .get_template("generator")
            .context("load generator template")?;
        let prompt = template
            .render(context! {
                issues => issues.issues,
                failure => issues.failure,
                previous_source => previous.map(|s| s.source.clone()),
                input_path => input_path.display().to_string(),
            })
            .context("render generator prompt")?;

        let value = self
            .process
            .invoke(Role::Generator, "generate", &prompt, CLEANING_SCRIPT_SCHEMA)?;
        let raw = value
            .get("script")
            .and_then(Value::as_str)
            .ok_or_else(|| unreachable_err(Role::Generator, "reply missing script".to_string()))?;
        let source = strip_code_fence(raw)?;

        Ok(match previous {
            Some(prev) => prev.revised(source),
            None => CleaningScript::initial(source),
        })
    }
}

/// Oracles are asked for bare source but sometimes wrap it in a Markdown
/// fence anyway; accept either.
fn strip_code_fence(raw: &str) -> Result<String> {
    let fence = Regex::new(r"(?s)^\s*```[a-zA-Z0-9_+-]*\r?\n(.*?)\r?\n?```\s*$")
        .context("compile fence regex")?;
    if let Some(captures) = fence.captures(raw) {
        return Ok(captures[1].to_string());
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_python_fence() {
        let raw = "```python\nimport json\nprint('hi')\n```";
        assert_eq!(
            strip_code_fence(raw).expect("strip"),
            "import json\nprint('hi')"
        );
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\nx = 1\n```\n";
        assert_eq!(strip_code_fence(raw).expect("strip"), "x = 1");
    }

    #[test]
    fn leaves_unfenced_source_alone() {
        let raw = "import json\n";
        assert_eq!(strip_code_fence(raw).expect("strip"), raw);
    }

    #[test]
    fn issue_report_schema_accepts_valid_reply() {
        let value = serde_json::json!({"issues": ["null value in 'age'"], "failure": null});
        validate_against_schema(&value, ISSUE_REPORT_SCHEMA).expect("valid");
    }

    #[test]
    fn issue_report_schema_rejects_wrong_shape() {
        let value = serde_json::json!({"issues": "not a list"});
        assert!(validate_against_schema(&value, ISSUE_REPORT_SCHEMA).is_err());
    }

    #[test]
    fn cleaning_script_schema_requires_script() {
        let ok = serde_json::json!({"script": "import json"});
        validate_against_schema(&ok, CLEANING_SCRIPT_SCHEMA).expect("valid");
        let bad = serde_json::json!({});
        assert!(validate_against_schema(&bad, CLEANING_SCRIPT_SCHEMA).is_err());
    }

    #[test]
    fn prompt_templates_parse() {
        // Constructing the engine panics on malformed templates; keep that
        // failure inside the test suite.
        let engine = PromptEngine::new();
        let rendered = engine
            .env
            .get_template("inspector")
            .expect("template")
            .render(context! {
                dataset_path => "data.jsonl",
                preview => "{\"a\":1}",
                preview_lines => 3usize,
                record_count => 10usize,
            })
            .expect("render");
        assert!(rendered.contains("data.jsonl"));
    }

    #[test]
    fn generator_template_includes_previous_script() {
        let engine = PromptEngine::new();
        let rendered = engine
            .env
            .get_template("generator")
            .expect("template")
            .render(context! {
                issues => vec!["duplicate records".to_string()],
                failure => Option::<String>::None,
                previous_source => Some("import json".to_string()),
                input_path => "raw.jsonl",
            })
            .expect("render");
        assert!(rendered.contains("duplicate records"));
        assert!(rendered.contains("import json"));
    }
}
