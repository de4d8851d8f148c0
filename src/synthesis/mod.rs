//! Synthetic task generation and validation.
//!
//! New shell tasks are generated from pairs of seed tasks, checked for a
//! failing initial state, solved `k` times by a model in fresh sandboxes and
//! persisted only when enough attempts succeed.

pub mod config;
pub mod dedup;
pub mod pipeline;
pub mod prompts;
pub mod solver;
pub mod store;
pub mod synthesizer;
pub mod task;
pub mod validator;

pub use config::SynthesisConfig;
pub use dedup::{Reservation, SeenTaskSet};
pub use pipeline::{PairOutcome, PipelineReport, SynthesisPipeline, TierReport};
pub use solver::{SolveOutcome, Solver, SolverStep};
pub use store::{RolloutRecord, SynthesisStore, TaskRecord};
pub use synthesizer::{parse_generated_task, TaskSynthesizer};
pub use task::ShellTask;
pub use validator::{AttemptRecord, TaskValidator, ValidationResult};
