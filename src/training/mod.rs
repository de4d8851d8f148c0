//! Trajectory groups for policy training and greedy benchmarking.
//!
//! Training consumes groups of scored rollouts of the same scenario; the
//! optimizer itself lives in an external backend.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::dataset::Scenario;
use crate::rollout::{RolloutConfig, RolloutEngine};
use crate::trajectory::Trajectory;

/// Default number of rollouts per scenario in a training group.
pub const DEFAULT_ROLLOUTS_PER_GROUP: usize = 4;

/// Scored rollouts of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryGroup {
    pub scenario_id: String,
    pub trajectories: Vec<Trajectory>,
}

impl TrajectoryGroup {
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn mean_reward(&self) -> f64 {
        if self.trajectories.is_empty() {
            return 0.0;
        }
        self.trajectories.iter().map(|t| t.reward).sum::<f64>() / self.trajectories.len() as f64
    }
}

/// Collects groups of rollouts for training steps.
#[derive(Clone)]
pub struct GroupCollector {
    engine: RolloutEngine,
    rollouts_per_group: usize,
    config: RolloutConfig,
}

impl GroupCollector {
    pub fn new(engine: RolloutEngine) -> Self {
        Self {
            engine,
            rollouts_per_group: DEFAULT_ROLLOUTS_PER_GROUP,
            config: RolloutConfig::default(),
        }
    }

    pub fn with_rollouts_per_group(mut self, rollouts_per_group: usize) -> Self {
        self.rollouts_per_group = rollouts_per_group;
        self
    }

    pub fn with_config(mut self, config: RolloutConfig) -> Self {
        self.config = config;
        self
    }

    /// One group per scenario, in input order.
    ///
    /// Failed rollouts are logged and skipped; corrupted trajectories are dropped.
    pub async fn collect(&self, scenarios: &[Scenario]) -> Vec<TrajectoryGroup> {
        join_all(scenarios.iter().map(|s| self.collect_group(s))).await
    }

    async fn collect_group(&self, scenario: &Scenario) -> TrajectoryGroup {
        let runs = (0..self.rollouts_per_group)
            .map(|_| self.engine.run_and_score(scenario, &self.config));

        let mut trajectories = Vec::with_capacity(self.rollouts_per_group);
        let mut corrupted = 0usize;
        for result in join_all(runs).await {
            match result {
                Ok(t) if t.corrupted => corrupted += 1,
                Ok(t) => trajectories.push(t),
                Err(e) => {
                    tracing::warn!(scenario_id = %scenario.id, error = %e, "Rollout failed, skipping");
                }
            }
        }

        tracing::debug!(
            scenario_id = %scenario.id,
            kept = trajectories.len(),
            corrupted = corrupted,
            "Collected trajectory group"
        );
        TrajectoryGroup {
            scenario_id: scenario.id.clone(),
            trajectories,
        }
    }
}

/// Result of a greedy benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub trajectories: Vec<Trajectory>,
    pub mean_reward: f64,
    /// Fraction of rollouts whose success condition passed.
    pub accuracy: f64,
}

/// Run one greedy rollout per scenario and report mean reward and accuracy.
///
/// Rollouts that fail outright count as zero reward and unsolved.
pub async fn benchmark(engine: &RolloutEngine, scenarios: &[Scenario]) -> BenchmarkReport {
    let config = RolloutConfig::for_benchmark();
    let results = join_all(scenarios.iter().map(|s| engine.run_and_score(s, &config))).await;

    let mut trajectories = Vec::with_capacity(scenarios.len());
    for (scenario, result) in scenarios.iter().zip(results) {
        match result {
            Ok(t) => trajectories.push(t),
            Err(e) => tracing::warn!(scenario_id = %scenario.id, error = %e, "Benchmark rollout failed"),
        }
    }

    let n = scenarios.len();
    let (mean_reward, accuracy) = if n == 0 {
        (0.0, 0.0)
    } else {
        let total: f64 = trajectories.iter().map(|t| t.reward).sum();
        let passed = trajectories.iter().filter(|t| t.success_condition_passed).count();
        (total / n as f64, passed as f64 / n as f64)
    };

    tracing::info!(
        scenarios = n,
        completed = trajectories.len(),
        mean_reward = mean_reward,
        accuracy = accuracy,
        "Benchmark finished"
    );
    BenchmarkReport {
        trajectories,
        mean_reward,
        accuracy,
    }
}
