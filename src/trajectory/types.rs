//! Trajectory data types for rollout recording.
//!
//! A trajectory is the complete record of one rollout: the transcript exchanged
//! with the policy model, the exit codes observed in the sandbox, the outcome
//! of the success condition and the shaped reward.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{Message, Role};

/// Ordered conversation between the environment and the policy model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript(Vec<Message>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Start a transcript with a single system message.
    pub fn with_system(content: impl Into<String>) -> Self {
        Self(vec![Message::system(content)])
    }

    pub fn push(&mut self, message: Message) {
        self.0.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Estimated token count: total content characters over `chars_per_token`.
    pub fn approx_tokens(&self, chars_per_token: f64) -> f64 {
        let chars: usize = self.0.iter().map(|m| m.content.chars().count()).sum();
        chars as f64 / chars_per_token
    }

    /// Number of assistant messages.
    pub fn assistant_turns(&self) -> usize {
        self.0.iter().filter(|m| m.role == Role::Assistant).count()
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self(messages)
    }
}

/// How a rollout's turn loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The session shell exited.
    Exited,
    /// The turn budget ran out.
    MaxTurns,
    /// The estimated context exceeded the model budget.
    BudgetExhausted,
    /// Executing a command failed at the service level.
    ExecFailed,
}

impl Termination {
    /// Whether a passing success condition counts for this ending.
    pub fn allows_success(&self) -> bool {
        matches!(self, Termination::Exited | Termination::MaxTurns)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Exited => "exited",
            Termination::MaxTurns => "max_turns",
            Termination::BudgetExhausted => "budget_exhausted",
            Termination::ExecFailed => "exec_failed",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique identifier for this trajectory.
    pub id: Uuid,

    /// Identifier of the scenario that was run.
    pub scenario_id: String,

    /// Sandbox the rollout executed in.
    pub sandbox_id: String,

    pub messages: Transcript,

    /// Exit codes of session commands, in execution order.
    pub exit_codes: Vec<i64>,

    pub success_condition_passed: bool,

    /// Set when the model hit its token ceiling at least once, or when
    /// reward shaping failed. A corrupted trajectory scores 0.
    pub corrupted: bool,

    pub reward: f64,

    /// Named reward components and counters.
    pub metrics: BTreeMap<String, f64>,

    pub termination: Termination,

    pub created_at: DateTime<Utc>,
}

impl Trajectory {
    /// Create an unscored trajectory.
    pub fn new(
        scenario_id: impl Into<String>,
        sandbox_id: impl Into<String>,
        messages: Transcript,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scenario_id: scenario_id.into(),
            sandbox_id: sandbox_id.into(),
            messages,
            exit_codes: Vec::new(),
            success_condition_passed: false,
            corrupted: false,
            reward: 0.0,
            metrics: BTreeMap::new(),
            termination: Termination::MaxTurns,
            created_at: Utc::now(),
        }
    }

    /// Turns taken by the model, at least 1.
    pub fn turns(&self) -> usize {
        self.messages.assistant_turns().max(1)
    }

    /// Recorded exit codes other than 0, including the failure sentinel.
    pub fn nonzero_exit_count(&self) -> usize {
        self.exit_codes.iter().filter(|&&code| code != 0).count()
    }
}
