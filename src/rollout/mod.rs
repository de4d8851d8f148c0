//! Rollout execution.
//!
//! A rollout runs one [`Scenario`](crate::dataset::Scenario) to completion in a
//! fresh sandbox, driven by the policy model, and yields a
//! [`Trajectory`](crate::trajectory::Trajectory).

pub mod config;
pub mod engine;

pub use config::{PromptStyle, RolloutConfig, RolloutSettings};
pub use engine::RolloutEngine;
