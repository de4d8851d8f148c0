//! Rollout trajectories and reward shaping.
//!
//! A [`Trajectory`] records one rollout; the [`RewardShaper`] turns its outcome
//! into a scalar reward and stores every reward term in its metrics.
//!
//! ```rust,ignore
//! use shell_forge::trajectory::RewardShaper;
//!
//! let shaper = RewardShaper::default();
//! let breakdown = shaper.shape(true, 3, 0)?;
//! assert!(breakdown.reward > 0.9);
//! ```

pub mod reward;
pub mod types;

pub use reward::{RewardBreakdown, RewardParams, RewardShaper};
pub use types::{Termination, Trajectory, Transcript};
