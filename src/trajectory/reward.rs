//! Reward shaping for completed rollouts.
//!
//! The reward combines a success term that decays logistically with the number
//! of turns taken, a penalty proportional to the rate of failing commands, and
//! a small per-turn penalty on failure:
//!
//! ```text
//! L(T)         = 1 / (1 + exp((T - t0) / tau))
//! error_rate   = min(1, E / max(1, T))
//! success_term = success ? 1 - alpha_len * (1 - L(T)) : 0
//! exit_penalty = alpha_exit * error_rate
//! fail_penalty = success ? 0 : eps_fail * T
//! reward       = clamp(success_term - exit_penalty - fail_penalty, -1, 1)
//! ```

use serde::{Deserialize, Serialize};

use super::types::Trajectory;
use crate::error::RewardError;

/// Default weight of the length decay on the success term.
pub const DEFAULT_ALPHA_LEN: f64 = 0.4;

/// Default weight of the exit-code error rate.
pub const DEFAULT_ALPHA_EXIT: f64 = 0.1;

/// Default per-turn penalty on failure.
pub const DEFAULT_EPS_FAIL: f64 = 0.01;

/// Default turn count at which the length factor is 0.5.
pub const DEFAULT_T0: f64 = 15.0;

/// Default temperature of the length decay.
pub const DEFAULT_TAU: f64 = 2.5;

/// Parameters of the reward function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardParams {
    pub alpha_len: f64,
    pub alpha_exit: f64,
    pub eps_fail: f64,
    pub t0: f64,
    pub tau: f64,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            alpha_len: DEFAULT_ALPHA_LEN,
            alpha_exit: DEFAULT_ALPHA_EXIT,
            eps_fail: DEFAULT_EPS_FAIL,
            t0: DEFAULT_T0,
            tau: DEFAULT_TAU,
        }
    }
}

impl RewardParams {
    /// Reject non-finite weights and a non-positive `tau`.
    pub fn validate(&self) -> Result<(), RewardError> {
        let weights = [
            ("alpha_len", self.alpha_len),
            ("alpha_exit", self.alpha_exit),
            ("eps_fail", self.eps_fail),
            ("t0", self.t0),
        ];
        for (name, value) in weights {
            if !value.is_finite() {
                return Err(RewardError::InvalidParameter { name, value });
            }
        }
        if !self.tau.is_finite() || self.tau <= 0.0 {
            return Err(RewardError::InvalidParameter {
                name: "tau",
                value: self.tau,
            });
        }
        Ok(())
    }
}

/// Every term of one reward computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardBreakdown {
    pub success: bool,
    pub turns: usize,
    pub nonzero_exit_codes: usize,
    pub length_factor: f64,
    pub exit_error_rate: f64,
    pub success_term: f64,
    pub exit_penalty: f64,
    pub fail_penalty: f64,
    pub reward: f64,
}

impl RewardBreakdown {
    /// Named metric values, as stored on a trajectory.
    pub fn metrics(&self) -> [(&'static str, f64); 8] {
        [
            ("length_factor", self.length_factor),
            ("success_term", self.success_term),
            ("exit_penalty", self.exit_penalty),
            ("fail_penalty", self.fail_penalty),
            ("exit_error_rate", self.exit_error_rate),
            ("success", if self.success { 1.0 } else { 0.0 }),
            ("turns", self.turns as f64),
            ("nonzero_exit_codes", self.nonzero_exit_codes as f64),
        ]
    }
}

/// Maps rollout outcomes to a scalar reward in [-1, 1].
#[derive(Debug, Clone, Default)]
pub struct RewardShaper {
    params: RewardParams,
}

impl RewardShaper {
    pub fn new(params: RewardParams) -> Result<Self, RewardError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Build a shaper without validating; invalid parameters surface from [`RewardShaper::shape`].
    pub fn unchecked(params: RewardParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RewardParams {
        &self.params
    }

    /// Logistic length factor for `turns`.
    pub fn length_factor(&self, turns: usize) -> f64 {
        let t = turns as f64;
        1.0 / (1.0 + ((t - self.params.t0) / self.params.tau).exp())
    }

    /// Compute the reward for an outcome. `turns` below 1 is treated as 1.
    pub fn shape(
        &self,
        success: bool,
        turns: usize,
        nonzero_exit_codes: usize,
    ) -> Result<RewardBreakdown, RewardError> {
        self.params.validate()?;
        let p = &self.params;
        let turns = turns.max(1);
        let t = turns as f64;

        let length_factor = self.length_factor(turns);
        let exit_error_rate = (nonzero_exit_codes as f64 / t).min(1.0);
        let success_term = if success {
            1.0 - p.alpha_len * (1.0 - length_factor)
        } else {
            0.0
        };
        let exit_penalty = p.alpha_exit * exit_error_rate;
        let fail_penalty = if success { 0.0 } else { p.eps_fail * t };
        let raw = success_term - exit_penalty - fail_penalty;

        for (term, value) in [
            ("length_factor", length_factor),
            ("success_term", success_term),
            ("exit_penalty", exit_penalty),
            ("fail_penalty", fail_penalty),
            ("reward", raw),
        ] {
            if !value.is_finite() {
                return Err(RewardError::NonFinite { term });
            }
        }

        Ok(RewardBreakdown {
            success,
            turns,
            nonzero_exit_codes,
            length_factor,
            exit_error_rate,
            success_term,
            exit_penalty,
            fail_penalty,
            reward: raw.clamp(-1.0, 1.0),
        })
    }

    /// Score a trajectory in place.
    ///
    /// Corrupted trajectories get their metrics but a reward of 0; a shaping
    /// error marks the trajectory corrupted.
    pub fn score(&self, trajectory: &mut Trajectory) -> Option<RewardBreakdown> {
        match self.shape(
            trajectory.success_condition_passed,
            trajectory.turns(),
            trajectory.nonzero_exit_count(),
        ) {
            Ok(breakdown) => {
                for (name, value) in breakdown.metrics() {
                    trajectory.metrics.insert(name.to_string(), value);
                }
                trajectory.reward = if trajectory.corrupted {
                    0.0
                } else {
                    breakdown.reward
                };
                Some(breakdown)
            }
            Err(e) => {
                tracing::warn!(
                    scenario_id = %trajectory.scenario_id,
                    error = %e,
                    "Reward shaping failed; marking trajectory corrupted"
                );
                trajectory.corrupted = true;
                trajectory.reward = 0.0;
                None
            }
        }
    }
}
