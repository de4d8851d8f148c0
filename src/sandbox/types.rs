//! Wire types exchanged with the sandbox service.

use serde::{Deserialize, Serialize};

/// Container image used when none is configured.
pub const DEFAULT_IMAGE: &str = "deathbyknowledge/shellm-sandbox:latest";

/// Exit code the service reports when the execution layer itself failed.
pub const EXEC_FAILURE_EXIT_CODE: i64 = -1;

/// Result of executing one command in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    /// Combined stdout/stderr of the command.
    pub output: String,
    /// Exit code, or [`EXEC_FAILURE_EXIT_CODE`].
    pub exit_code: i64,
    /// Whether the session shell exited (e.g. after `exit 0`).
    pub exited: bool,
}

impl ExecOutcome {
    pub fn new(output: impl Into<String>, exit_code: i64, exited: bool) -> Self {
        Self {
            output: output.into(),
            exit_code,
            exited,
        }
    }
}

/// Which rendering of the command history to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryFormat {
    /// JSON list of executed commands and their results.
    Structured,
    /// Human-readable shell transcript.
    Formatted,
}

/// Command history of a sandbox as returned by the service.
#[derive(Debug, Clone)]
pub enum SandboxTrajectory {
    Formatted(String),
    Structured(CommandHistory),
}

impl SandboxTrajectory {
    /// Text form: the formatted transcript, or the structured entries as JSON.
    pub fn into_text(self) -> String {
        match self {
            SandboxTrajectory::Formatted(text) => text,
            SandboxTrajectory::Structured(history) => {
                serde_json::to_string(&history.trajectory).unwrap_or_default()
            }
        }
    }
}

/// Structured command history of a sandbox session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandHistory {
    pub sandbox_id: String,
    pub command_count: usize,
    pub trajectory: Vec<CommandEntry>,
}

/// One session command and, once it finished, its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub index: usize,
    pub command: String,
    /// Seconds since the sandbox started.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandEntryResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntryResult {
    pub output: String,
    pub exit_code: i64,
}

/// Summary of a sandbox known to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub id: String,
    pub image: String,
    pub setup_commands: String,
    pub status: String,
    pub session_command_count: usize,
    pub last_standalone_exit_code: Option<i64>,
}
