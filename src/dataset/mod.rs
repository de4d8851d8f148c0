//! Scenario datasets stored as local JSONL splits.
//!
//! A dataset directory holds one `<split>.jsonl` file per split (`train.jsonl`,
//! `test.jsonl`, ...). Each row describes one sandboxed task:
//!
//! ```json
//! {"task_id": "a1", "task": "...", "setup_commands": ["mkdir -p /data"],
//!  "success_condition": "test -f /data/out", "difficulty_level": 2}
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::synthesis::ShellTask;

/// A task the agent is asked to complete in a fresh sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(alias = "task_id")]
    pub id: String,
    pub task: String,
    pub setup_commands: Vec<String>,
    /// Command that exits 0 once the task is done.
    pub success_condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<u32>,
}

/// Selection applied by [`ScenarioDataset::load_scenarios`].
#[derive(Debug, Clone, Default)]
pub struct ScenarioQuery {
    pub limit: Option<usize>,
    pub shuffle: bool,
    /// Seed for a reproducible shuffle; setting it implies shuffling.
    pub seed: Option<u64>,
    pub difficulty: Option<u32>,
}

impl ScenarioQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_shuffle(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = Some(difficulty);
        self
    }
}

/// Scenario splits under a local directory.
#[derive(Debug, Clone)]
pub struct ScenarioDataset {
    dir: PathBuf,
}

impl ScenarioDataset {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn split_path(&self, split: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", split))
    }

    /// Every scenario of a split, in file order.
    pub async fn read_split(&self, split: &str) -> Result<Vec<Scenario>, DatasetError> {
        let path = self.split_path(split);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatasetError::SplitNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|source| DatasetError::InvalidRow {
                    path: path.display().to_string(),
                    line: idx + 1,
                    source,
                })
            })
            .collect()
    }

    /// Load scenarios of a split, filtered by difficulty, optionally shuffled, then limited.
    pub async fn load_scenarios(
        &self,
        split: &str,
        query: &ScenarioQuery,
    ) -> Result<Vec<Scenario>, DatasetError> {
        let mut scenarios = self.read_split(split).await?;

        if let Some(difficulty) = query.difficulty {
            scenarios.retain(|s| s.difficulty_level == Some(difficulty));
        }

        if query.shuffle || query.seed.is_some() {
            let mut rng = match query.seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_rng(&mut rand::rng()),
            };
            scenarios.shuffle(&mut rng);
        }

        if let Some(limit) = query.limit {
            scenarios.truncate(limit);
        }

        tracing::debug!(split = %split, count = scenarios.len(), "Loaded scenarios");
        Ok(scenarios)
    }

    /// Seed tasks of one difficulty tier in file order, setup commands joined by `"; "`.
    pub async fn seed_tasks(&self, split: &str, difficulty: u32) -> Result<Vec<ShellTask>, DatasetError> {
        Ok(self
            .read_split(split)
            .await?
            .into_iter()
            .filter(|s| s.difficulty_level == Some(difficulty))
            .map(|s| ShellTask {
                task: s.task,
                setup_commands: s.setup_commands.join("; "),
                success_condition: s.success_condition,
                difficulty_level: difficulty,
            })
            .collect())
    }

    /// Distinct difficulty tiers present in a split, ascending.
    pub async fn difficulties(&self, split: &str) -> Result<Vec<u32>, DatasetError> {
        let tiers: BTreeSet<u32> = self
            .read_split(split)
            .await?
            .iter()
            .filter_map(|s| s.difficulty_level)
            .collect();
        Ok(tiers.into_iter().collect())
    }
}
