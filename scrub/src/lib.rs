//! Iterative repair loop for line-delimited JSON datasets.
//!
//! An external inspector oracle judges a dataset against a fixed rule set; a
//! generator oracle produces or revises a cleaning script for the reported
//! defects; a sandbox executes the script against the pristine raw input; the
//! cycle repeats until the output passes or the turn budget runs out. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: pure, deterministic types and state (reports, scripts,
//!   artifact state). No I/O, fully testable in isolation.
//! - **[`io`]**: side-effecting operations (filesystem, subprocesses, oracle
//!   plumbing). Isolated to enable scripted doubles in tests.
//!
//! The [`run`] module coordinates core logic with I/O to implement the loop;
//! [`events`] defines the observer contract consumed by display layers.

pub mod core;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
