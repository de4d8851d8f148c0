//! Application configuration.
//!
//! Values come from defaults, then an optional YAML file, then environment
//! variables; CLI flags are applied last by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rollout::{RolloutConfig, RolloutSettings};
use crate::synthesis::SynthesisConfig;

/// Default sandbox service URL.
pub const DEFAULT_SANDBOX_URL: &str = "http://localhost:3000";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Sandbox service connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub url: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SANDBOX_URL.to_string(),
        }
    }
}

/// Model endpoint connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL; required before any model call.
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    /// Model used when a component does not name its own.
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Default scenario directory.
pub const DEFAULT_DATASET_DIR: &str = "data";

/// Top-level configuration shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub rollout: RolloutSettings,
    /// Per-rollout sampling parameters.
    pub sampling: RolloutConfig,
    pub synthesis: SynthesisConfig,
    /// Directory holding `<split>.jsonl` scenario files.
    pub dataset_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            llm: LlmConfig::default(),
            rollout: RolloutSettings::default(),
            sampling: RolloutConfig::default(),
            synthesis: SynthesisConfig::default(),
            dataset_dir: PathBuf::from(DEFAULT_DATASET_DIR),
        }
    }
}

impl AppConfig {
    /// Load a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(text)?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `SHELL_FORGE_SANDBOX_URL`: Sandbox service URL
    /// - `LITELLM_API_BASE`, `LITELLM_API_KEY`: Model endpoint
    /// - `LITELLM_DEFAULT_MODEL`: Default model
    /// - `SHELL_FORGE_IMAGE`: Sandbox image for rollouts and synthesis
    /// - `SHELL_FORGE_MAX_MODEL_TOKENS`: Rollout context budget
    /// - `SHELL_FORGE_MAX_TURNS`: Rollout turn limit
    /// - `SHELL_FORGE_TEMPERATURE`: Rollout sampling temperature
    /// - `SHELL_FORGE_REMOVE_ON_STOP`: Remove rollout sandboxes on stop
    /// - `SHELL_FORGE_DATASET_DIR`: Scenario directory
    /// - `SHELL_FORGE_OUT_DIR`: Synthesis output directory
    /// - `SHELL_FORGE_K`: Solve attempts per candidate
    /// - `SHELL_FORGE_THRESHOLD`: Required solve fraction
    /// - `SHELL_FORGE_TASKS_PER_DIFFICULTY`: Accepted tasks wanted per tier
    /// - `SHELL_FORGE_SAVE_ALL_ROLLOUTS`: Persist unsolved rollouts too
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable cannot be parsed.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SHELL_FORGE_SANDBOX_URL") {
            self.sandbox.url = val;
        }

        // Model endpoint
        if let Some(val) = lookup("LITELLM_API_BASE") {
            self.llm.api_base = Some(val);
        }
        if let Some(val) = lookup("LITELLM_API_KEY") {
            self.llm.api_key = Some(val);
        }
        if let Some(val) = lookup("LITELLM_DEFAULT_MODEL") {
            self.llm.model = val;
        }

        // Rollouts
        if let Some(val) = lookup("SHELL_FORGE_IMAGE") {
            self.rollout.image = val.clone();
            self.synthesis.image = val;
        }
        if let Some(val) = lookup("SHELL_FORGE_MAX_MODEL_TOKENS") {
            self.rollout.max_model_tokens = parse_env_value(&val, "SHELL_FORGE_MAX_MODEL_TOKENS")?;
        }
        if let Some(val) = lookup("SHELL_FORGE_MAX_TURNS") {
            self.sampling.max_turns = parse_env_value(&val, "SHELL_FORGE_MAX_TURNS")?;
        }
        if let Some(val) = lookup("SHELL_FORGE_TEMPERATURE") {
            self.sampling.temperature = parse_env_value(&val, "SHELL_FORGE_TEMPERATURE")?;
        }
        if let Some(val) = lookup("SHELL_FORGE_REMOVE_ON_STOP") {
            self.rollout.remove_on_stop = parse_env_bool(&val, "SHELL_FORGE_REMOVE_ON_STOP")?;
        }
        if let Some(val) = lookup("SHELL_FORGE_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(val);
        }

        // Synthesis
        if let Some(val) = lookup("SHELL_FORGE_OUT_DIR") {
            self.synthesis.out_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("SHELL_FORGE_K") {
            self.synthesis.k = parse_env_value(&val, "SHELL_FORGE_K")?;
        }
        if let Some(val) = lookup("SHELL_FORGE_THRESHOLD") {
            self.synthesis.threshold = parse_env_value(&val, "SHELL_FORGE_THRESHOLD")?;
        }
        if let Some(val) = lookup("SHELL_FORGE_TASKS_PER_DIFFICULTY") {
            self.synthesis.tasks_per_difficulty =
                parse_env_value(&val, "SHELL_FORGE_TASKS_PER_DIFFICULTY")?;
        }
        if let Some(val) = lookup("SHELL_FORGE_SAVE_ALL_ROLLOUTS") {
            self.synthesis.save_all_rollouts =
                parse_env_bool(&val, "SHELL_FORGE_SAVE_ALL_ROLLOUTS")?;
        }

        Ok(())
    }

    /// Fill empty per-component model ids with the shared default.
    pub fn resolve_models(&mut self) {
        if self.rollout.model.is_empty() {
            self.rollout.model = self.llm.model.clone();
        }
        if self.synthesis.model.is_empty() {
            self.synthesis.model = self.llm.model.clone();
        }
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "sandbox.url cannot be empty".to_string(),
            ));
        }

        if self.llm.model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm.model cannot be empty".to_string(),
            ));
        }

        if self.rollout.image.is_empty() || self.synthesis.image.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "image cannot be empty".to_string(),
            ));
        }

        if self.rollout.max_model_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_model_tokens must be greater than 0".to_string(),
            ));
        }

        if self.rollout.chars_per_token.is_nan() || self.rollout.chars_per_token <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "chars_per_token must be greater than 0".to_string(),
            ));
        }

        if self.sampling.max_turns == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_turns must be greater than 0".to_string(),
            ));
        }

        if self.sampling.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.sampling.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.synthesis.threshold) {
            return Err(ConfigError::ValidationFailed(
                "threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.synthesis.k == 0 {
            return Err(ConfigError::ValidationFailed(
                "k must be greater than 0".to_string(),
            ));
        }

        if self.synthesis.seed_step == 0 {
            return Err(ConfigError::ValidationFailed(
                "seed_step must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
