//! Recording helpers for rollout and synthesis metrics.
//!
//! Each helper is a no-op until [`init_metrics`](super::init_metrics) has run.

use super::prometheus::{CANDIDATES_TOTAL, ROLLOUTS_CORRUPTED, ROLLOUTS_TOTAL, ROLLOUT_REWARD};

/// Record a scored rollout.
///
/// # Arguments
///
/// * `termination` - Why the turn loop ended (e.g. "exited", "max_turns")
/// * `corrupted` - Whether the trajectory was marked corrupted
/// * `reward` - The shaped reward
pub fn record_rollout(termination: &str, corrupted: bool, reward: f64) {
    if let Some(total) = ROLLOUTS_TOTAL.get() {
        total.with_label_values(&[termination]).inc();
    }

    if corrupted {
        if let Some(counter) = ROLLOUTS_CORRUPTED.get() {
            counter.inc();
        }
    }

    if let Some(histogram) = ROLLOUT_REWARD.get() {
        histogram.observe(reward);
    }

    tracing::trace!(
        termination = termination,
        corrupted = corrupted,
        reward = reward,
        "Recorded rollout metric"
    );
}

/// Record the outcome of one synthesized candidate.
pub fn record_candidate(outcome: &str) {
    if let Some(total) = CANDIDATES_TOTAL.get() {
        total.with_label_values(&[outcome]).inc();
    }
    tracing::trace!(outcome = outcome, "Recorded candidate metric");
}
