//! Persistence of accepted tasks and their solver rollouts.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::task::{short_id, ShellTask};
use super::validator::AttemptRecord;
use crate::error::StoreError;
use crate::storage::JsonlLog;

/// File name of the accepted-task log.
pub const TASKS_FILE: &str = "generated_tasks.jsonl";

/// File name of the rollout log.
pub const ROLLOUTS_FILE: &str = "rollouts.jsonl";

fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// An accepted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub task: String,
    pub setup_commands: Vec<String>,
    pub success_condition: String,
    pub difficulty_level: u32,
    pub k: usize,
    pub threshold: f64,
    pub timestamp: String,
}

impl TaskRecord {
    pub fn new(task: &ShellTask, k: usize, threshold: f64) -> Self {
        Self {
            id: short_id(),
            task: task.task.clone(),
            setup_commands: vec![task.setup_commands.clone()],
            success_condition: task.success_condition.clone(),
            difficulty_level: task.difficulty_level,
            k,
            threshold,
            timestamp: utc_now(),
        }
    }
}

/// A solver attempt on an accepted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutRecord {
    pub id: String,
    pub task_id: String,
    pub attempt: usize,
    pub solved: bool,
    pub history: String,
    pub difficulty_level: u32,
    pub timestamp: String,
}

impl RolloutRecord {
    pub fn new(task: &TaskRecord, attempt: usize, record: &AttemptRecord) -> Self {
        Self {
            id: short_id(),
            task_id: task.id.clone(),
            attempt,
            solved: record.solved,
            history: record.history.clone(),
            difficulty_level: task.difficulty_level,
            timestamp: utc_now(),
        }
    }
}

/// Append-only task and rollout logs under one output directory.
#[derive(Debug)]
pub struct SynthesisStore {
    tasks: JsonlLog,
    rollouts: JsonlLog,
}

impl SynthesisStore {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        let out_dir = out_dir.as_ref();
        Self {
            tasks: JsonlLog::new(out_dir.join(TASKS_FILE)),
            rollouts: JsonlLog::new(out_dir.join(ROLLOUTS_FILE)),
        }
    }

    pub async fn load_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.tasks.read_all().await
    }

    pub async fn load_rollouts(&self) -> Result<Vec<RolloutRecord>, StoreError> {
        self.rollouts.read_all().await
    }

    /// Append one accepted task.
    pub async fn save_task(&self, task: &TaskRecord) -> Result<(), StoreError> {
        self.tasks.append(task).await
    }

    /// Append the attempts of a saved task; unsolved attempts only when `save_all`.
    ///
    /// Returns the number of rollout records written.
    pub async fn save_rollouts(
        &self,
        task: &TaskRecord,
        attempts: &[AttemptRecord],
        save_all: bool,
    ) -> Result<usize, StoreError> {
        let mut written = 0;
        for (idx, attempt) in attempts.iter().enumerate() {
            if save_all || attempt.solved {
                self.rollouts
                    .append(&RolloutRecord::new(task, idx, attempt))
                    .await?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Persist a task followed by its attempts.
    pub async fn save(
        &self,
        task: &TaskRecord,
        attempts: &[AttemptRecord],
        save_all: bool,
    ) -> Result<usize, StoreError> {
        self.save_task(task).await?;
        self.save_rollouts(task, attempts, save_all).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_task() -> ShellTask {
        ShellTask {
            task: "Rotate logs".to_string(),
            setup_commands: "mkdir /logs; touch /logs/a".to_string(),
            success_condition: "test -f /logs/a.1".to_string(),
            difficulty_level: 2,
        }
    }

    fn attempts() -> Vec<AttemptRecord> {
        vec![
            AttemptRecord { solved: true, history: "[]".to_string() },
            AttemptRecord { solved: false, history: "Exception: boom".to_string() },
            AttemptRecord { solved: true, history: "[{}]".to_string() },
        ]
    }

    #[tokio::test]
    async fn test_save_only_solved_rollouts() {
        let dir = TempDir::new().expect("tempdir");
        let store = SynthesisStore::new(dir.path());
        let record = TaskRecord::new(&shell_task(), 3, 0.5);

        assert_eq!(store.save(&record, &attempts(), false).await.expect("save"), 2);

        let tasks = store.load_tasks().await.expect("tasks");
        assert_eq!(tasks, vec![record.clone()]);
        assert_eq!(tasks[0].setup_commands, vec!["mkdir /logs; touch /logs/a".to_string()]);

        let rollouts = store.load_rollouts().await.expect("rollouts");
        let indices: Vec<usize> = rollouts.iter().map(|r| r.attempt).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(rollouts.iter().all(|r| r.task_id == record.id && r.difficulty_level == 2));
    }

    #[tokio::test]
    async fn test_save_all_rollouts() {
        let dir = TempDir::new().expect("tempdir");
        let store = SynthesisStore::new(dir.path());
        let record = TaskRecord::new(&shell_task(), 3, 0.5);

        assert_eq!(store.save(&record, &attempts(), true).await.expect("save"), 3);
        assert_eq!(store.load_rollouts().await.expect("rollouts")[1].history, "Exception: boom");
    }

    #[test]
    fn test_record_ids_and_timestamps() {
        let record = TaskRecord::new(&shell_task(), 4, 0.5);
        assert_eq!(record.id.len(), 8);
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
        assert!(record.timestamp.ends_with("+00:00"));
    }
}
