use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shell task as exchanged with the generator and the validators.
///
/// Setup commands are kept as one shell string (`cmd1; cmd2`), the form in
/// which the generator emits them and the sandbox runs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellTask {
    pub task: String,
    pub setup_commands: String,
    pub success_condition: String,
    pub difficulty_level: u32,
}

/// Collapse whitespace runs and lowercase, for duplicate detection.
pub fn normalize_task_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First 8 hex characters of a random UUID.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
