//! Line-delimited JSON dataset inspection.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

/// The dataset file does not exist. Raised before a run starts, or if the
/// input vanishes mid-run; distinct from a script-raised execution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputNotFoundError {
    pub path: PathBuf,
}

impl fmt::Display for InputNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input dataset not found: {}", self.path.display())
    }
}

impl std::error::Error for InputNotFoundError {}

/// Return the first `lines` records of a JSONL file, one compact JSON object
/// per line.
///
/// Lines that fail to parse are included verbatim with the parse error
/// appended, so the inspector sees malformed records instead of the preview
/// failing outright: a broken line is a data defect, not an infrastructure
/// error.
pub fn preview(path: &Path, lines: usize) -> Result<String> {
    if !path.is_file() {
        return Err(InputNotFoundError {
            path: path.to_path_buf(),
        }
        .into());
    }
    debug!(path = %path.display(), lines, "previewing dataset");

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        if idx >= lines {
            break;
        }
        let line = line.with_context(|| format!("read line {} of {}", idx + 1, path.display()))?;
        if line.trim().is_empty() {
            out.push(format!("line {}: <empty line>", idx + 1));
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(value) => out.push(value.to_string()),
            Err(err) => out.push(format!("{}  <line {}: invalid JSON: {}>", line.trim(), idx + 1, err)),
        }
    }

    Ok(out.join("\n"))
}

/// Count non-empty lines in a JSONL file.
pub fn count_records(path: &Path) -> Result<usize> {
    if !path.is_file() {
        return Err(InputNotFoundError {
            path: path.to_path_buf(),
        }
        .into());
    }
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut count = 0usize;
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}
