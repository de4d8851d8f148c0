//! Prometheus metrics registration and export.
//!
//! This module defines the Prometheus metrics used by shell-forge and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all shell-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Completed rollouts, labeled by termination reason.
pub static ROLLOUTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Rollouts whose trajectory was marked corrupted.
pub static ROLLOUTS_CORRUPTED: OnceLock<Counter> = OnceLock::new();

/// Distribution of shaped rewards.
pub static ROLLOUT_REWARD: OnceLock<Histogram> = OnceLock::new();

/// Synthesized candidates, labeled by pipeline outcome.
pub static CANDIDATES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Until then every recording call is a no-op.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let rollouts_total = CounterVec::new(
        Opts::new("shell_forge_rollouts_total", "Total number of completed rollouts"),
        &["termination"],
    )?;

    let rollouts_corrupted = Counter::new(
        "shell_forge_rollouts_corrupted_total",
        "Total rollouts marked corrupted",
    )?;

    let rollout_reward = Histogram::with_opts(
        HistogramOpts::new("shell_forge_rollout_reward", "Distribution of shaped rewards")
            .buckets(vec![-0.1, 0.0, 0.1, 0.2, 0.4, 0.6, 0.8, 0.9, 1.0]),
    )?;

    let candidates_total = CounterVec::new(
        Opts::new(
            "shell_forge_synthesis_candidates_total",
            "Total synthesized task candidates by outcome",
        ),
        &["outcome"],
    )?;

    registry.register(Box::new(rollouts_total.clone()))?;
    registry.register(Box::new(rollouts_corrupted.clone()))?;
    registry.register(Box::new(rollout_reward.clone()))?;
    registry.register(Box::new(candidates_total.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = ROLLOUTS_TOTAL.set(rollouts_total);
    let _ = ROLLOUTS_CORRUPTED.set(rollouts_corrupted);
    let _ = ROLLOUT_REWARD.set(rollout_reward);
    let _ = CANDIDATES_TOTAL.set(candidates_total);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
