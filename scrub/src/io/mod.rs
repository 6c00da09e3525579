//! Side-effecting operations: filesystem, subprocesses, oracle plumbing.

pub mod config;
pub mod dataset;
pub mod oracle;
pub mod paths;
pub mod process;
pub mod sandbox;
pub mod turn_log;
