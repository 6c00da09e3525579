//! HTTP route handlers for the UI API.

use std::fs;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scrub::io::config::load_config;
use scrub::io::oracle::{CodexGenerator, CodexInspector};
use scrub::io::paths::{ScrubPaths, generate_run_id};
use scrub::io::sandbox::InterpreterSandbox;
use scrub::run::{CancelToken, LoopDeps, LoopStop, RunRequest, run_repair_loop};

use crate::state::{AppState, BroadcastSink, RunStatus};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/files", get(list_files))
        .route("/runs", get(list_runs).post(start_run))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/files - list `.jsonl` files in the data directory.
async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    let entries = fs::read_dir(&state.data_dir).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl")
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
        {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(Json(files))
}

/// GET /api/runs - list known runs and their status.
async fn list_runs(State(state): State<AppState>) -> Result<Json<Vec<RunStatus>>, StatusCode> {
    let runs = state.runs.read().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let mut statuses: Vec<RunStatus> = runs.values().cloned().collect();
    statuses.sort_by(|a, b| a.run_id.cmp(&b.run_id));
    Ok(Json(statuses))
}

#[derive(Debug, Deserialize)]
pub struct StartRunBody {
    pub file: String,
    pub preview_lines: Option<usize>,
    pub max_turns: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: String,
}

/// POST /api/runs - launch a cleaning run for one input file.
///
/// Rejects missing files before any turn starts. The run executes on a
/// blocking task with its own workspace; progress is observable on the SSE
/// feed.
async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRunBody>,
) -> Result<Json<StartRunResponse>, (StatusCode, String)> {
    if !is_safe_file_name(&body.file) {
        return Err((StatusCode::BAD_REQUEST, format!("invalid file name: {}", body.file)));
    }
    let input_path = state.data_dir.join(&body.file);
    if !input_path.is_file() {
        return Err((StatusCode::NOT_FOUND, format!("dataset not found: {}", body.file)));
    }

    let config = load_config(&ScrubPaths::new(&state.workdir).config_path)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))?;

    let run_id = generate_run_id();
    state.register_run(RunStatus {
        run_id: run_id.clone(),
        file: body.file.clone(),
        state: "running".to_string(),
        turns_taken: None,
    });
    info!(run_id = %run_id, file = %body.file, "launching run");

    let request = RunRequest {
        run_id: run_id.clone(),
        input_path,
        workdir: state.run_workdir(&run_id),
        preview_lines: body.preview_lines.unwrap_or(config.preview_lines_default),
        max_turns: body.max_turns.unwrap_or(config.max_turns_default),
    };
    let sink = BroadcastSink::new(state.event_tx.as_ref().clone());
    let registry = state.clone();
    let registry_run_id = run_id.clone();

    tokio::spawn(async move {
        let result = tokio::task::spawn_blocking(move || {
            let scrub_paths = ScrubPaths::new(&request.workdir);
            let inspector = CodexInspector::new(&config, scrub_paths.oracle_dir.clone());
            let generator = CodexGenerator::new(&config, scrub_paths.oracle_dir);
            let sandbox = InterpreterSandbox::new(config.sandbox.interpreter.clone());
            let deps = LoopDeps {
                inspector: &inspector,
                generator: &generator,
                sandbox: &sandbox,
                config: &config,
            };
            run_repair_loop(&deps, &request, &sink, &CancelToken::new())
        })
        .await;

        match result {
            Ok(Ok(outcome)) => {
                let state_label = match outcome.stop {
                    LoopStop::Valid => "valid",
                    LoopStop::Exhausted { .. } => "exhausted",
                    LoopStop::Aborted { .. } => "aborted",
                };
                registry.finish_run(&registry_run_id, state_label, Some(outcome.turns_taken));
            }
            Ok(Err(err)) => {
                warn!(run_id = %registry_run_id, err = %format!("{err:#}"), "run failed");
                registry.finish_run(&registry_run_id, "aborted", None);
            }
            Err(err) => {
                warn!(run_id = %registry_run_id, err = %err, "run task panicked");
                registry.finish_run(&registry_run_id, "aborted", None);
            }
        }
    });

    Ok(Json(StartRunResponse { run_id }))
}

/// Only bare file names are accepted; anything that could traverse out of
/// the data directory is rejected.
fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && name != "."
        && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_file_names() {
        assert!(!is_safe_file_name("../etc/passwd"));
        assert!(!is_safe_file_name("a/b.jsonl"));
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name(".."));
        assert!(is_safe_file_name("mixed_example.jsonl"));
    }

    #[tokio::test]
    async fn list_files_returns_sorted_jsonl_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("b.jsonl"), "{}\n").expect("write");
        std::fs::write(temp.path().join("a.jsonl"), "{}\n").expect("write");
        std::fs::write(temp.path().join("notes.txt"), "x").expect("write");

        let state = AppState::new(temp.path().to_path_buf(), temp.path().to_path_buf());
        let Json(files) = list_files(State(state)).await.expect("list");
        assert_eq!(files, vec!["a.jsonl".to_string(), "b.jsonl".to_string()]);
    }

    #[tokio::test]
    async fn start_run_rejects_missing_dataset() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = AppState::new(temp.path().to_path_buf(), temp.path().to_path_buf());

        let result = start_run(
            State(state),
            Json(StartRunBody {
                file: "absent.jsonl".to_string(),
                preview_lines: None,
                max_turns: None,
            }),
        )
        .await;

        let (status, message) = result.err().expect("should reject");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(message.contains("absent.jsonl"));
    }
}
