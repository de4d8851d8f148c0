//! Synthesis pipeline configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sandbox::DEFAULT_IMAGE;

/// Default number of solve attempts per candidate.
pub const DEFAULT_K: usize = 4;

/// Default fraction of attempts that must succeed.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Default turn budget of one solve attempt.
pub const DEFAULT_SOLVER_MAX_TURNS: u32 = 15;

/// Attempts per generation or solver completion.
pub const DEFAULT_LLM_ATTEMPTS: u32 = 3;

/// Configuration for task synthesis and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Generator/solver model id; empty means the provider's default.
    pub model: String,
    pub generation_temperature: f64,
    pub solver_temperature: f64,
    pub solver_max_turns: u32,
    /// Attempts per generation and per solver completion.
    pub llm_attempts: u32,
    /// Concurrent solve attempts per candidate.
    pub k: usize,
    /// Minimum fraction of solved attempts.
    pub threshold: f64,
    /// Accepted tasks wanted per difficulty tier.
    pub tasks_per_difficulty: usize,
    /// Tiers to fill; discovered from the seed corpus when unset.
    pub difficulties: Option<Vec<u32>>,
    /// Seed-window advance per pair.
    pub seed_step: usize,
    /// Persist unsolved rollouts as well as solved ones.
    pub save_all_rollouts: bool,
    /// Dataset split seed tasks are drawn from.
    pub seed_split: String,
    pub out_dir: PathBuf,
    pub image: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            generation_temperature: 1.0,
            solver_temperature: 0.7,
            solver_max_turns: DEFAULT_SOLVER_MAX_TURNS,
            llm_attempts: DEFAULT_LLM_ATTEMPTS,
            k: DEFAULT_K,
            threshold: DEFAULT_THRESHOLD,
            tasks_per_difficulty: 3,
            difficulties: None,
            seed_step: 2,
            save_all_rollouts: false,
            seed_split: "train".to_string(),
            out_dir: PathBuf::from("data"),
            image: DEFAULT_IMAGE.to_string(),
        }
    }
}

impl SynthesisConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_tasks_per_difficulty(mut self, tasks: usize) -> Self {
        self.tasks_per_difficulty = tasks;
        self
    }

    pub fn with_difficulties(mut self, difficulties: Vec<u32>) -> Self {
        self.difficulties = Some(difficulties);
        self
    }

    pub fn with_seed_step(mut self, seed_step: usize) -> Self {
        self.seed_step = seed_step;
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }
}
