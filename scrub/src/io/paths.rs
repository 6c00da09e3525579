//! Canonical paths under `<workdir>/.scrub/` and run-id generation.

use std::path::PathBuf;

use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};

/// Well-known name of the latest cleaned output in the workdir.
pub const CLEANED_OUTPUT_NAME: &str = "cleaned_output.jsonl";

/// All canonical paths for one workdir.
#[derive(Debug, Clone)]
pub struct ScrubPaths {
    pub workdir: PathBuf,
    pub scrub_dir: PathBuf,
    pub config_path: PathBuf,
    pub runs_dir: PathBuf,
    pub oracle_dir: PathBuf,
    /// Fixed, well-known location of the latest cleaned output.
    pub output_path: PathBuf,
}

impl ScrubPaths {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let scrub_dir = workdir.join(".scrub");
        Self {
            config_path: scrub_dir.join("config.toml"),
            runs_dir: scrub_dir.join("runs"),
            oracle_dir: scrub_dir.join("oracle"),
            output_path: workdir.join(CLEANED_OUTPUT_NAME),
            scrub_dir,
            workdir,
        }
    }

    /// Directory holding one turn's artifacts.
    pub fn turn_dir(&self, run_id: &str, turn: u32) -> PathBuf {
        self.runs_dir.join(run_id).join(turn.to_string())
    }
}

/// Generate a run id: UTC timestamp plus a short random suffix, so that runs
/// launched within the same second still get distinct directories.
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("run-{timestamp}-{}", suffix.to_lowercase())
}

/// Reject ids that would escape the runs directory or read poorly in logs.
pub fn validate_run_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
