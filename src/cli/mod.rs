//! Command-line interface for shell-forge.
//!
//! Provides commands for checking the sandbox service, collecting scored
//! rollouts, benchmarking a policy and synthesizing new tasks.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
