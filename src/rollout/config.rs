//! Rollout configuration.
//!
//! [`RolloutConfig`] holds sampling parameters for one invocation;
//! [`RolloutSettings`] holds engine-wide settings shared by every rollout.

use serde::{Deserialize, Serialize};

use crate::sandbox::DEFAULT_IMAGE;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Default completion token ceiling per turn.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Default turn budget.
pub const DEFAULT_MAX_TURNS: u32 = 30;

/// Default estimated context budget of the policy model.
pub const DEFAULT_MAX_MODEL_TOKENS: u32 = 32_000;

/// Characters per token used for context estimation.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.0;

/// Default completion attempts per turn.
pub const DEFAULT_COMPLETION_ATTEMPTS: u32 = 3;

/// Command substituted when a completion is truncated.
pub const DEFAULT_EXIT_COMMAND: &str = "exit 0";

/// Sampling parameters for one rollout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_turns: u32,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

impl RolloutConfig {
    /// Greedy decoding, as used for benchmarking.
    pub fn for_benchmark() -> Self {
        Self::default().with_temperature(0.0)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }
}

/// How the scenario task is presented to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// The system message is the task text itself, for shell-tuned models.
    #[default]
    Raw,
    /// The task is wrapped in instructions describing shell mode.
    ShellMode,
}

impl PromptStyle {
    /// Render the system message for `task`.
    pub fn render(&self, task: &str) -> String {
        match self {
            PromptStyle::Raw => task.to_string(),
            PromptStyle::ShellMode => SHELL_MODE_PROMPT.replace("{task}", task),
        }
    }
}

const SHELL_MODE_PROMPT: &str = r#"[SHELL MODE]
Shell mode is enabled. User streams have been replaced with standard output and standard error streams.
Outputs are not streamed to the user but piped directly to standard input. For reasoning traces, you can prepend with `#` so the shell treats them as comments.
On startup, standard output will print the task. To signal the completion of your run, use `exit 0`.

TASK: {task}"#;

/// Engine-wide rollout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSettings {
    /// Policy model id; empty means the provider's default.
    pub model: String,
    pub image: String,
    /// Estimated context budget; the rollout ends once exceeded.
    pub max_model_tokens: u32,
    pub chars_per_token: f64,
    /// Remove sandboxes when stopping them.
    pub remove_on_stop: bool,
    pub prompt_style: PromptStyle,
    pub completion_attempts: u32,
    /// Command executed in place of a truncated completion.
    pub exit_command: String,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            image: DEFAULT_IMAGE.to_string(),
            max_model_tokens: DEFAULT_MAX_MODEL_TOKENS,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            remove_on_stop: true,
            prompt_style: PromptStyle::Raw,
            completion_attempts: DEFAULT_COMPLETION_ATTEMPTS,
            exit_command: DEFAULT_EXIT_COMMAND.to_string(),
        }
    }
}

impl RolloutSettings {
    pub fn with_max_model_tokens(mut self, max_model_tokens: u32) -> Self {
        self.max_model_tokens = max_model_tokens;
        self
    }

    pub fn with_prompt_style(mut self, prompt_style: PromptStyle) -> Self {
        self.prompt_style = prompt_style;
        self
    }

    pub fn with_remove_on_stop(mut self, remove_on_stop: bool) -> Self {
        self.remove_on_stop = remove_on_stop;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RolloutConfig::default();
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.max_turns, 30);
        assert_eq!(RolloutConfig::for_benchmark().temperature, 0.0);

        let settings = RolloutSettings::default();
        assert_eq!(settings.image, "deathbyknowledge/shellm-sandbox:latest");
        assert_eq!(settings.max_model_tokens, 32_000);
        assert!(settings.remove_on_stop);
        assert_eq!(settings.exit_command, "exit 0");
    }

    #[test]
    fn test_prompt_styles() {
        assert_eq!(PromptStyle::Raw.render("find the log"), "find the log");

        let wrapped = PromptStyle::ShellMode.render("find the log");
        assert!(wrapped.starts_with("[SHELL MODE]"));
        assert!(wrapped.ends_with("TASK: find the log"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: RolloutSettings =
            serde_yaml::from_str("prompt_style: shell_mode\nremove_on_stop: false\n")
                .expect("parse");
        assert_eq!(settings.prompt_style, PromptStyle::ShellMode);
        assert!(!settings.remove_on_stop);
        assert_eq!(settings.chars_per_token, 3.0);
    }
}
