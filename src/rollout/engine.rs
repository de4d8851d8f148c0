//! Multi-turn rollout of one scenario in one sandbox.
//!
//! The engine moves through `Initializing -> Turn(n) -> Finished`:
//!
//! 1. Create and start a sandbox with the scenario's setup commands. Failure
//!    here aborts the rollout with [`RolloutError::Setup`].
//! 2. Each turn checks the estimated context budget, asks the policy model for
//!    the next command (bounded retries), executes it in the session and feeds
//!    the output back as the next user message.
//! 3. Once the loop ends, the success condition is evaluated standalone exactly
//!    once and the sandbox is released.

use std::sync::Arc;

use crate::dataset::Scenario;
use crate::error::{LlmError, RolloutError};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::metrics;
use crate::sandbox::{SandboxLease, SandboxService, EXEC_FAILURE_EXIT_CODE};
use crate::trajectory::{RewardShaper, Termination, Trajectory, Transcript};
use crate::utils::attempt;

use super::config::{RolloutConfig, RolloutSettings};

/// A model reply reduced to the command to run.
struct NextCommand {
    command: String,
    truncated: bool,
}

/// Runs rollouts against a sandbox service and a policy model.
#[derive(Clone)]
pub struct RolloutEngine {
    sandbox: Arc<dyn SandboxService>,
    llm: Arc<dyn LlmProvider>,
    settings: RolloutSettings,
    shaper: RewardShaper,
}

impl RolloutEngine {
    pub fn new(
        sandbox: Arc<dyn SandboxService>,
        llm: Arc<dyn LlmProvider>,
        settings: RolloutSettings,
    ) -> Self {
        Self {
            sandbox,
            llm,
            settings,
            shaper: RewardShaper::default(),
        }
    }

    pub fn settings(&self) -> &RolloutSettings {
        &self.settings
    }

    /// Run a rollout and score it.
    pub async fn run_and_score(
        &self,
        scenario: &Scenario,
        config: &RolloutConfig,
    ) -> Result<Trajectory, RolloutError> {
        let mut trajectory = self.run(scenario, config).await?;
        self.shaper.score(&mut trajectory);

        metrics::record_rollout(
            trajectory.termination.as_str(),
            trajectory.corrupted,
            trajectory.reward,
        );
        tracing::info!(
            scenario_id = %scenario.id,
            sandbox_id = %trajectory.sandbox_id,
            termination = %trajectory.termination,
            success = trajectory.success_condition_passed,
            corrupted = trajectory.corrupted,
            reward = trajectory.reward,
            "Rollout finished"
        );
        Ok(trajectory)
    }

    /// Run a rollout without scoring it.
    pub async fn run(
        &self,
        scenario: &Scenario,
        config: &RolloutConfig,
    ) -> Result<Trajectory, RolloutError> {
        let lease = SandboxLease::create(
            Arc::clone(&self.sandbox),
            &self.settings.image,
            &scenario.setup_commands,
            self.settings.remove_on_stop,
        )
        .await?;

        let system = self.settings.prompt_style.render(&scenario.task);
        let mut trajectory = Trajectory::new(&scenario.id, lease.id(), Transcript::with_system(system));

        if let Err(e) = lease.start().await {
            tracing::warn!(scenario_id = %scenario.id, sandbox_id = %lease.id(), error = %e, "Sandbox failed to start");
            lease.release().await;
            return Err(RolloutError::Setup(e));
        }

        let termination = match self.turn_loop(&lease, scenario, config, &mut trajectory).await {
            Ok(termination) => termination,
            Err(e) => {
                tracing::warn!(scenario_id = %scenario.id, error = %e, "Rollout aborted");
                lease.release().await;
                return Err(e);
            }
        };

        let passed = Self::evaluate(&lease, scenario).await;
        trajectory.termination = termination;
        trajectory.success_condition_passed = passed && termination.allows_success();
        lease.release().await;

        Ok(trajectory)
    }

    async fn turn_loop(
        &self,
        lease: &SandboxLease,
        scenario: &Scenario,
        config: &RolloutConfig,
        trajectory: &mut Trajectory,
    ) -> Result<Termination, RolloutError> {
        for turn in 1..=config.max_turns {
            let estimate = trajectory.messages.approx_tokens(self.settings.chars_per_token);
            if estimate > f64::from(self.settings.max_model_tokens) {
                tracing::info!(
                    scenario_id = %scenario.id,
                    turn = turn,
                    estimated_tokens = estimate,
                    "Context budget exhausted"
                );
                return Ok(Termination::BudgetExhausted);
            }

            let next = self.next_command(&trajectory.messages, config).await?;
            let command = if next.truncated {
                tracing::warn!(scenario_id = %scenario.id, turn = turn, "Completion hit max_tokens; substituting exit command");
                trajectory.corrupted = true;
                self.settings.exit_command.clone()
            } else {
                next.command
            };
            trajectory.messages.push(Message::assistant(command.clone()));

            match lease.exec(&command, false).await {
                Ok(outcome) => {
                    trajectory.messages.push(Message::user(outcome.output));
                    if outcome.exited {
                        tracing::debug!(scenario_id = %scenario.id, turn = turn, "Session exited");
                        return Ok(Termination::Exited);
                    }
                    if outcome.exit_code >= 0 {
                        trajectory.exit_codes.push(outcome.exit_code);
                    } else {
                        tracing::warn!(
                            scenario_id = %scenario.id,
                            exit_code = outcome.exit_code,
                            "Execution layer reported failure exit code"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(scenario_id = %scenario.id, sandbox_id = %lease.id(), error = %e, "Error running command in sandbox");
                    trajectory
                        .messages
                        .push(Message::user(format!("Error running command: {}", e)));
                    trajectory.exit_codes.push(EXEC_FAILURE_EXIT_CODE);
                    return Ok(Termination::ExecFailed);
                }
            }
        }

        Ok(Termination::MaxTurns)
    }

    async fn next_command(
        &self,
        transcript: &Transcript,
        config: &RolloutConfig,
    ) -> Result<NextCommand, RolloutError> {
        let request = GenerationRequest::new(self.settings.model.clone(), transcript.messages().to_vec())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        let llm = &self.llm;
        let max_tokens = config.max_tokens;

        attempt(self.settings.completion_attempts, "Policy completion", move |_| {
            let request = request.clone();
            async move {
                let response = llm.generate(request).await?;
                let command = response
                    .first_content()
                    .ok_or(LlmError::EmptyResponse)?
                    .to_string();
                Ok::<_, LlmError>(NextCommand {
                    command,
                    truncated: response.usage.completion_tokens >= max_tokens,
                })
            }
        })
        .await
        .map_err(|e| RolloutError::ModelExhausted {
            attempts: e.attempts,
            last: e.last,
        })
    }

    async fn evaluate(lease: &SandboxLease, scenario: &Scenario) -> bool {
        match lease.exec(&scenario.success_condition, true).await {
            Ok(outcome) => outcome.exit_code == 0,
            Err(e) => {
                tracing::warn!(scenario_id = %scenario.id, error = %e, "Error running success condition in sandbox");
                false
            }
        }
    }
}
