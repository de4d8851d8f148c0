//! Metrics module for Prometheus-based monitoring.
//!
//! Counts rollouts by termination reason, tracks the reward distribution, and
//! tallies synthesized candidates by pipeline outcome.
//!
//! # Example
//!
//! ```ignore
//! use shell_forge::metrics::{init_metrics, export_metrics, record_rollout};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! record_rollout("exited", false, 0.97);
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{record_candidate, record_rollout};
pub use prometheus::{
    export_metrics, init_metrics, CANDIDATES_TOTAL, REGISTRY, ROLLOUTS_CORRUPTED, ROLLOUTS_TOTAL,
    ROLLOUT_REWARD,
};
