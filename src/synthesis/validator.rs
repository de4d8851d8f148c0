//! Validation of candidate tasks.
//!
//! A candidate is accepted only if
//! - its setup runs cleanly and its success condition fails right after setup;
//! - enough of `k` concurrent solve attempts make the success condition pass.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::config::SynthesisConfig;
use super::solver::Solver;
use super::task::ShellTask;
use crate::error::SandboxError;
use crate::llm::LlmProvider;
use crate::sandbox::{SandboxLease, SandboxService};

/// Outcome of one solve attempt as recorded by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub solved: bool,
    pub history: String,
}

/// Result of a solvability check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub passed: bool,
    pub successes: usize,
    /// One record per attempt, in launch order.
    pub attempts: Vec<AttemptRecord>,
}

impl ValidationResult {
    pub fn success_rate(&self) -> f64 {
        self.successes as f64 / self.attempts.len().max(1) as f64
    }
}

/// Validates candidate tasks against the sandbox service.
pub struct TaskValidator {
    sandbox: Arc<dyn SandboxService>,
    solver: Solver,
    image: String,
}

impl TaskValidator {
    pub fn new(
        sandbox: Arc<dyn SandboxService>,
        llm: Arc<dyn LlmProvider>,
        config: &SynthesisConfig,
    ) -> Self {
        Self {
            solver: Solver::new(Arc::clone(&sandbox), llm, config),
            sandbox,
            image: config.image.clone(),
        }
    }

    /// Setup must succeed and leave the success condition failing.
    ///
    /// Any error counts as invalid. The sandbox is always stopped and removed.
    pub async fn validate_setup(&self, task: &ShellTask) -> bool {
        let lease = match SandboxLease::create(
            Arc::clone(&self.sandbox),
            &self.image,
            std::slice::from_ref(&task.setup_commands),
            true,
        )
        .await
        {
            Ok(lease) => lease,
            Err(e) => {
                tracing::warn!(error = %e, "Setup validation error");
                return false;
            }
        };

        let valid = match Self::initial_exit_code(&lease, task).await {
            Ok(code) => code != 0,
            Err(e) => {
                tracing::warn!(sandbox_id = %lease.id(), error = %e, "Setup validation error");
                false
            }
        };
        lease.release().await;
        valid
    }

    async fn initial_exit_code(lease: &SandboxLease, task: &ShellTask) -> Result<i64, SandboxError> {
        lease.start().await?;
        let outcome = lease.exec(&task.success_condition, true).await?;
        Ok(outcome.exit_code)
    }

    /// Run `k` solve attempts concurrently; pass iff `successes / max(k, 1) >= threshold`.
    pub async fn validate_solvability(
        &self,
        task: &ShellTask,
        k: usize,
        threshold: f64,
    ) -> ValidationResult {
        let results = join_all((0..k).map(|_| self.solver.solve(task))).await;

        let attempts: Vec<AttemptRecord> = results
            .into_iter()
            .enumerate()
            .map(|(idx, result)| match result {
                Ok(outcome) => AttemptRecord {
                    solved: outcome.solved,
                    history: outcome.history,
                },
                Err(e) => {
                    tracing::warn!(attempt = idx, error = %e, "Solve attempt failed");
                    AttemptRecord {
                        solved: false,
                        history: format!("Exception: {}", e),
                    }
                }
            })
            .collect();

        let successes = attempts.iter().filter(|a| a.solved).count();
        let passed = successes as f64 / k.max(1) as f64 >= threshold;
        tracing::debug!(successes = successes, k = k, passed = passed, "Solvability checked");

        ValidationResult {
            passed,
            successes,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecOutcome;
    use crate::test_support::{MockSandbox, ScriptedLlm};

    fn candidate(setup: &str) -> ShellTask {
        ShellTask {
            task: "Create /tmp/f".to_string(),
            setup_commands: setup.to_string(),
            success_condition: "test -f /tmp/f".to_string(),
            difficulty_level: 1,
        }
    }

    /// `test -f /tmp/f` passes iff the setup already touched the file.
    fn file_sandbox() -> MockSandbox {
        MockSandbox::new().with_exec(|call| {
            if call.standalone {
                let exists = call.setup_commands.iter().any(|c| c.contains("touch /tmp/f"));
                return Ok(ExecOutcome::new("", if exists { 0 } else { 1 }, false));
            }
            Ok(ExecOutcome::new("", 0, call.command == "exit 0"))
        })
    }

    fn validator(sandbox: Arc<MockSandbox>) -> TaskValidator {
        let llm = Arc::new(ScriptedLlm::always("#Reasoning#: done\n#Command#: exit 0"));
        TaskValidator::new(sandbox, llm, &SynthesisConfig::default())
    }

    #[tokio::test]
    async fn test_setup_valid_when_condition_initially_fails() {
        let sandbox = Arc::new(file_sandbox());
        assert!(validator(sandbox.clone()).validate_setup(&candidate("mkdir -p /tmp")).await);
        assert_eq!(sandbox.created()[0].1, vec!["mkdir -p /tmp".to_string()]);
        assert_eq!(sandbox.stops(), vec![("sb-1".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_setup_invalid_when_condition_already_passes() {
        let sandbox = Arc::new(file_sandbox());
        assert!(!validator(sandbox.clone()).validate_setup(&candidate("touch /tmp/f")).await);
        assert_eq!(sandbox.stops().len(), 1);
    }

    #[tokio::test]
    async fn test_setup_invalid_when_start_fails() {
        let sandbox = Arc::new(file_sandbox().failing_start());
        assert!(!validator(sandbox.clone()).validate_setup(&candidate("false")).await);
        assert_eq!(sandbox.stops(), vec![("sb-1".to_string(), true)]);
    }

    /// Sandboxes numbered in `solved` pass their success condition; those in
    /// `failing_exec` fail every exec call.
    fn scripted_outcomes(solved: &'static [usize], failing_exec: &'static [usize]) -> MockSandbox {
        MockSandbox::new().with_exec(move |call| {
            let n: usize = call.sandbox_id.trim_start_matches("sb-").parse().unwrap_or(0);
            if failing_exec.contains(&n) {
                return Err(SandboxError::from_status(
                    500,
                    "container died",
                    format!("/sandboxes/{}/exec", call.sandbox_id),
                ));
            }
            if call.standalone {
                let code = if solved.contains(&n) { 0 } else { 1 };
                return Ok(ExecOutcome::new("", code, false));
            }
            Ok(ExecOutcome::new("", 0, call.command == "exit 0"))
        })
    }

    #[tokio::test]
    async fn test_solvability_passes_at_threshold() {
        let sandbox = Arc::new(scripted_outcomes(&[1, 3], &[]));
        let result = validator(sandbox.clone())
            .validate_solvability(&candidate("mkdir -p /tmp"), 4, 0.5)
            .await;

        assert!(result.passed);
        assert_eq!(result.successes, 2);
        assert_eq!(result.attempts.len(), 4);
        assert_eq!(sandbox.created().len(), 4);
        assert!(sandbox.stops().iter().all(|(_, remove)| !remove));
    }

    #[tokio::test]
    async fn test_solvability_fails_below_threshold() {
        let sandbox = Arc::new(scripted_outcomes(&[2], &[]));
        let result = validator(sandbox)
            .validate_solvability(&candidate("mkdir -p /tmp"), 4, 0.5)
            .await;

        assert!(!result.passed);
        assert_eq!(result.successes, 1);
        assert!((result.success_rate() - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_erroring_attempt_counts_as_unsolved() {
        let sandbox = Arc::new(scripted_outcomes(&[1, 2], &[2]));
        let result = validator(sandbox)
            .validate_solvability(&candidate("mkdir -p /tmp"), 4, 0.5)
            .await;

        assert!(!result.passed);
        assert_eq!(result.successes, 1);
        let failed: Vec<&AttemptRecord> = result
            .attempts
            .iter()
            .filter(|a| a.history.starts_with("Exception: "))
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(!failed[0].solved);
    }

    #[tokio::test]
    async fn test_zero_attempts_uses_unit_denominator() {
        let sandbox = Arc::new(file_sandbox());
        let v = validator(sandbox);
        let result = v.validate_solvability(&candidate("x"), 0, 0.5).await;
        assert!(!result.passed);
        assert!(result.attempts.is_empty());

        let lenient = v.validate_solvability(&candidate("x"), 0, 0.0).await;
        assert!(lenient.passed);
    }
}
