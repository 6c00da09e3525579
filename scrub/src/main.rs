//! Iterative JSONL cleaning loop.
//!
//! `scrub run` drives an inspector/generator oracle pair and a sandboxed
//! interpreter against a raw dataset until it passes inspection or the turn
//! budget runs out. `scrub preview` prints the first lines of a dataset the
//! way the inspector sees them.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use scrub::events::{EventKind, EventSink, RunEvent};
use scrub::exit_codes;
use scrub::io::config::load_config;
use scrub::io::dataset::{self, InputNotFoundError};
use scrub::io::oracle::{CodexGenerator, CodexInspector};
use scrub::io::paths::{ScrubPaths, generate_run_id};
use scrub::io::sandbox::InterpreterSandbox;
use scrub::run::{CancelToken, LoopDeps, LoopStop, RunRequest, run_repair_loop};

#[derive(Parser)]
#[command(name = "scrub", version, about = "Iterative JSONL cleaning loop")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean a dataset until it passes inspection or the turn budget runs out.
    Run {
        /// Path to the raw line-delimited JSON file.
        dataset: PathBuf,
        /// Lines handed to the inspector per evaluation.
        #[arg(long)]
        preview_lines: Option<usize>,
        /// Maximum number of generate+execute attempts.
        #[arg(long)]
        max_turns: Option<u32>,
        /// Directory owning `.scrub/` state and the cleaned output.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Print the first lines of a dataset as compact JSON.
    Preview {
        /// Path to the line-delimited JSON file.
        dataset: PathBuf,
        /// Number of lines to show.
        #[arg(long, default_value_t = 3)]
        lines: usize,
    },
}

fn main() {
    scrub::logging::init();
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<InputNotFoundError>().is_some() {
                exit_codes::INPUT_NOT_FOUND
            } else {
                exit_codes::ERROR
            }
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            dataset,
            preview_lines,
            max_turns,
            workdir,
        } => cmd_run(dataset, preview_lines, max_turns, workdir),
        Command::Preview { dataset, lines } => cmd_preview(dataset, lines),
    }
}

fn cmd_run(
    dataset: PathBuf,
    preview_lines: Option<usize>,
    max_turns: Option<u32>,
    workdir: PathBuf,
) -> Result<i32> {
    // Reject a missing dataset before any turn starts.
    if !dataset.is_file() {
        return Err(InputNotFoundError { path: dataset }.into());
    }

    let paths = ScrubPaths::new(&workdir);
    let config = load_config(&paths.config_path)?;
    let preview_lines = preview_lines.unwrap_or(config.preview_lines_default);
    let max_turns = max_turns.unwrap_or(config.max_turns_default);
    if preview_lines == 0 {
        bail!("--preview-lines must be > 0");
    }
    if max_turns == 0 {
        bail!("--max-turns must be > 0");
    }
    let request = RunRequest {
        run_id: generate_run_id(),
        input_path: dataset,
        workdir,
        preview_lines,
        max_turns,
    };

    let inspector = CodexInspector::new(&config, paths.oracle_dir.clone());
    let generator = CodexGenerator::new(&config, paths.oracle_dir.clone());
    let sandbox = InterpreterSandbox::new(config.sandbox.interpreter.clone());
    let deps = LoopDeps {
        inspector: &inspector,
        generator: &generator,
        sandbox: &sandbox,
        config: &config,
    };

    println!("=== run {} starting ===", request.run_id);
    let outcome = run_repair_loop(&deps, &request, &ConsoleSink, &CancelToken::new())?;

    let code = match &outcome.stop {
        LoopStop::Valid => {
            println!(
                "dataset valid after {} turn(s); cleaned output: {}",
                outcome.turns_taken,
                outcome
                    .final_path
                    .as_deref()
                    .unwrap_or(paths.output_path.as_path())
                    .display()
            );
            exit_codes::VALID
        }
        LoopStop::Exhausted { max_turns } => {
            println!(
                "did not converge within {max_turns} turn(s); last artifact: {}",
                outcome
                    .final_path
                    .as_deref()
                    .unwrap_or(paths.output_path.as_path())
                    .display()
            );
            exit_codes::EXHAUSTED
        }
        LoopStop::Aborted { reason } => {
            eprintln!("run aborted: {reason}");
            exit_codes::ABORTED
        }
    };
    Ok(code)
}

fn cmd_preview(dataset: PathBuf, lines: usize) -> Result<i32> {
    let preview = dataset::preview(&dataset, lines)?;
    println!("{preview}");
    Ok(exit_codes::VALID)
}

/// Sink that narrates run progress on stdout.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &RunEvent) {
        match &event.kind {
            EventKind::TurnStarted { turn } => println!("--- turn {turn} ---"),
            EventKind::RoleInvoked { role, summary } => {
                println!("[{}] {summary}", role.as_str());
            }
            EventKind::ToolInvoked { name } => println!("[calling tool -> {name}]"),
            EventKind::ToolCompleted { name, summary } => {
                println!("[{name}] {summary}");
            }
            EventKind::RunTerminated { state, turns_taken } => {
                println!("=== run terminated: {state:?} after {turns_taken} turn(s) ===");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from(["scrub", "run", "data.jsonl"]);
        match cli.command {
            Command::Run {
                dataset,
                preview_lines,
                max_turns,
                workdir,
            } => {
                assert_eq!(dataset, PathBuf::from("data.jsonl"));
                assert_eq!(preview_lines, None);
                assert_eq!(max_turns, None);
                assert_eq!(workdir, PathBuf::from("."));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_run_with_budget() {
        let cli = Cli::parse_from(["scrub", "run", "data.jsonl", "--max-turns", "5"]);
        match cli.command {
            Command::Run { max_turns, .. } => assert_eq!(max_turns, Some(5)),
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_preview() {
        let cli = Cli::parse_from(["scrub", "preview", "data.jsonl", "--lines", "7"]);
        match cli.command {
            Command::Preview { dataset, lines } => {
                assert_eq!(dataset, PathBuf::from("data.jsonl"));
                assert_eq!(lines, 7);
            }
            _ => panic!("expected preview command"),
        }
    }

    #[test]
    fn missing_dataset_maps_to_input_not_found() {
        let err = cmd_run(
            PathBuf::from("/nonexistent/raw.jsonl"),
            None,
            None,
            PathBuf::from("."),
        )
        .unwrap_err();
        assert!(err.downcast_ref::<InputNotFoundError>().is_some());
    }
}
