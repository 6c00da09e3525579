//! Stable exit codes for the `scrub` CLI.

/// The dataset passed inspection.
pub const VALID: i32 = 0;
/// Invalid invocation, config, or other unexpected error.
pub const ERROR: i32 = 1;
/// Turn budget exhausted without a passing dataset.
pub const EXHAUSTED: i32 = 2;
/// The input dataset does not exist; the run never started.
pub const INPUT_NOT_FOUND: i32 = 3;
/// The run aborted on an infrastructure failure.
pub const ABORTED: i32 = 4;
