//! shell-forge: multi-turn shell-agent rollouts and synthetic shell tasks.
//!
//! This library drives a language model through shell sessions in remote
//! sandboxes, shapes rewards for the resulting trajectories, and generates new
//! shell tasks that are validated by repeated solving.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod rollout;
pub mod sandbox;
pub mod storage;
pub mod synthesis;
pub mod training;
pub mod trajectory;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used error types
pub use error::{
    ConfigError, DatasetError, LlmError, PipelineError, RewardError, RolloutError, SandboxError,
    StoreError, SynthesisError,
};
