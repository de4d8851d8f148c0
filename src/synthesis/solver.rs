//! A single solve attempt of a candidate task.
//!
//! The solver model sees the task and the formatted shell history, answers
//! with `#Reasoning#:` and `#Command#:` fields, and its reasoning is recorded
//! in the session as a shell comment before the command runs. Whatever
//! happens in the loop, the attempt ends by recording the structured history
//! and evaluating the success condition.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::config::SynthesisConfig;
use super::prompts::{solver_prompt, INITIAL_HISTORY};
use super::synthesizer::extract_field;
use super::task::ShellTask;
use crate::error::{LlmError, SynthesisError};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::sandbox::{SandboxLease, SandboxService, TrajectoryFormat};
use crate::utils::attempt;

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)#Reasoning#:(.*)#Command#").expect("Invalid regex for reasoning")
});

static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)#Command#:(.*)$").expect("Invalid regex for command"));

/// One parsed solver reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverStep {
    pub reasoning: String,
    pub command: String,
}

pub fn parse_solver_step(text: &str) -> Result<SolverStep, SynthesisError> {
    match (
        extract_field(&REASONING_RE, text),
        extract_field(&COMMAND_RE, text),
    ) {
        (Some(reasoning), Some(command)) => Ok(SolverStep { reasoning, command }),
        _ => Err(SynthesisError::Parse(
            "Failed to parse reasoning or command from response".to_string(),
        )),
    }
}

/// Result of one solve attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub solved: bool,
    /// Structured command history as JSON text.
    pub history: String,
}

/// Drives the solver model through one sandboxed attempt.
pub struct Solver {
    sandbox: Arc<dyn SandboxService>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_turns: u32,
    max_attempts: u32,
    image: String,
}

impl Solver {
    pub fn new(
        sandbox: Arc<dyn SandboxService>,
        llm: Arc<dyn LlmProvider>,
        config: &SynthesisConfig,
    ) -> Self {
        Self {
            sandbox,
            llm,
            model: config.model.clone(),
            temperature: config.solver_temperature,
            max_turns: config.solver_max_turns,
            max_attempts: config.llm_attempts,
            image: config.image.clone(),
        }
    }

    /// Run one attempt. The sandbox is kept (stopped, not removed) for inspection.
    pub async fn solve(&self, task: &ShellTask) -> Result<SolveOutcome, SynthesisError> {
        let lease = SandboxLease::create(
            Arc::clone(&self.sandbox),
            &self.image,
            std::slice::from_ref(&task.setup_commands),
            false,
        )
        .await?;

        if let Err(e) = self.drive(&lease, task).await {
            tracing::warn!(sandbox_id = %lease.id(), error = %e, "Solver error");
        }

        let outcome = Self::finalize(&lease, task).await;
        lease.release().await;
        outcome
    }

    async fn drive(&self, lease: &SandboxLease, task: &ShellTask) -> Result<(), SynthesisError> {
        lease.start().await?;

        let mut history = INITIAL_HISTORY.to_string();
        for turn in 1..=self.max_turns {
            let step = self.next_step(&task.task, &history).await?;
            lease.exec(&format!("# {}", step.reasoning), false).await?;
            let outcome = lease.exec(&step.command, false).await?;
            history = lease.trajectory(TrajectoryFormat::Formatted).await?.into_text();

            if outcome.exited {
                tracing::debug!(sandbox_id = %lease.id(), turn = turn, "Solver exited");
                break;
            }
        }
        Ok(())
    }

    async fn next_step(&self, task: &str, history: &str) -> Result<SolverStep, SynthesisError> {
        let prompt = solver_prompt(task, history);

        attempt(self.max_attempts, "Solver completion", move |_| {
            let request = GenerationRequest::new(self.model.clone(), vec![Message::user(prompt.clone())])
                .with_temperature(self.temperature);
            async move {
                let response = self.llm.generate(request).await?;
                let content = response.first_content().ok_or(LlmError::EmptyResponse)?;
                parse_solver_step(content)
            }
        })
        .await
        .map_err(|e| SynthesisError::Exhausted {
            attempts: e.attempts,
            source: Box::new(e.last),
        })
    }

    async fn finalize(lease: &SandboxLease, task: &ShellTask) -> Result<SolveOutcome, SynthesisError> {
        let history = lease
            .trajectory(TrajectoryFormat::Structured)
            .await?
            .into_text();
        let check = lease.exec(&task.success_condition, true).await?;
        Ok(SolveOutcome {
            solved: check.exit_code == 0,
            history,
        })
    }
}
