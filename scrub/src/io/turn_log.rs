//! Per-turn artifact persistence under `.scrub/runs/<run-id>/<turn>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::report::IssueReport;

/// Canonical file names inside one turn directory.
#[derive(Debug, Clone)]
pub struct TurnPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub report_path: PathBuf,
    pub script_path: PathBuf,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
}

impl TurnPaths {
    pub fn new(runs_dir: &Path, run_id: &str, turn: u32) -> Self {
        let dir = runs_dir.join(run_id).join(turn.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            report_path: dir.join("report.json"),
            script_path: dir.join("script.py"),
            output_path: dir.join("cleaned.jsonl"),
            log_path: dir.join("exec.log"),
            dir,
        }
    }
}

/// Bookkeeping for one completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnMeta {
    pub run_id: String,
    pub turn: u32,
    pub script_revision: u32,
    /// "succeeded" or "failed".
    pub outcome: String,
    pub duration_ms: u64,
}

/// Persist the report that drove a turn plus its metadata.
///
/// The script source, exec log, and cleaned output are written by the sandbox
/// into the same directory; this records the remaining pieces in
/// deterministic order so logs stay stable.
pub fn write_turn(paths: &TurnPaths, meta: &TurnMeta, report: &IssueReport) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create turn dir {}", paths.dir.display()))?;
    write_json(&paths.meta_path, meta)?;
    write_json(&paths.report_path, report)?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_paths_are_stable() {
        let paths = TurnPaths::new(Path::new("/w/.scrub/runs"), "run-1", 3);
        assert!(paths.dir.ends_with(Path::new("run-1/3")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.report_path.ends_with("report.json"));
        assert!(paths.script_path.ends_with("script.py"));
        assert!(paths.output_path.ends_with("cleaned.jsonl"));
        assert!(paths.log_path.ends_with("exec.log"));
    }

    #[test]
    fn writes_meta_and_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TurnPaths::new(temp.path(), "run-7", 1);
        let meta = TurnMeta {
            run_id: "run-7".to_string(),
            turn: 1,
            script_revision: 2,
            outcome: "failed".to_string(),
            duration_ms: 12,
        };
        let report = IssueReport::from_failure("trace");

        write_turn(&paths, &meta, &report).expect("write");

        assert!(paths.meta_path.is_file());
        let report_json = fs::read_to_string(&paths.report_path).expect("read report");
        assert!(report_json.contains("trace"));
    }
}
