//! Configuration stored under `.scrub/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Tool configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScrubConfig {
    /// Default turn budget when the caller does not pass one.
    pub max_turns_default: u32,

    /// Default number of preview lines handed to the inspector.
    pub preview_lines_default: usize,

    /// Wall-clock budget for one sandboxed script execution, in seconds.
    pub turn_timeout_secs: u64,

    /// Wall-clock budget for one oracle invocation, in seconds.
    pub oracle_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub sandbox: SandboxConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter argv the cleaning script is run with
    /// (e.g. `["python3"]`); the script, input, and output paths are
    /// appended as positional arguments.
    pub interpreter: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: vec!["python3".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Agent CLI argv used by the process-backed oracles
    /// (e.g. `["codex", "exec"]`).
    pub command: Vec<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string()],
        }
    }
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            max_turns_default: 24,
            preview_lines_default: 3,
            turn_timeout_secs: 5 * 60,
            oracle_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            sandbox: SandboxConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl ScrubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_turns_default == 0 {
            return Err(anyhow!("max_turns_default must be > 0"));
        }
        if self.preview_lines_default == 0 {
            return Err(anyhow!("preview_lines_default must be > 0"));
        }
        if self.turn_timeout_secs == 0 {
            return Err(anyhow!("turn_timeout_secs must be > 0"));
        }
        if self.oracle_timeout_secs == 0 {
            return Err(anyhow!("oracle_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.sandbox.interpreter.is_empty() || self.sandbox.interpreter[0].trim().is_empty() {
            return Err(anyhow!("sandbox.interpreter must be a non-empty array"));
        }
        if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ScrubConfig::default()`.
pub fn load_config(path: &Path) -> Result<ScrubConfig> {
    if !path.exists() {
        let cfg = ScrubConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ScrubConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ScrubConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ScrubConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = ScrubConfig {
            max_turns_default: 5,
            sandbox: SandboxConfig {
                interpreter: vec!["python3".to_string(), "-I".to_string()],
            },
            ..ScrubConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn empty_interpreter_is_rejected() {
        let cfg = ScrubConfig {
            sandbox: SandboxConfig {
                interpreter: Vec::new(),
            },
            ..ScrubConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let cfg = ScrubConfig {
            max_turns_default: 0,
            ..ScrubConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
