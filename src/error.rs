//! Error types for shell-forge operations.
//!
//! Defines error types for all major subsystems:
//! - Sandbox service calls (typed by HTTP status class)
//! - Model completion requests
//! - Rollout execution and reward shaping
//! - Task synthesis, validation and persistence
//! - Dataset loading and configuration

use std::fmt;

use thiserror::Error;

/// Details of a failed call to the sandbox service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// HTTP status code returned by the service.
    pub status: u16,
    /// Response body or a description of the malformed response.
    pub message: String,
    /// Path of the endpoint that was called (e.g. `/sandboxes/abc/exec`).
    pub endpoint: String,
}

impl ApiFailure {
    pub fn new(status: u16, message: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP {} when calling {}: {}",
            self.status, self.endpoint, self.message
        )
    }
}

/// Errors returned by the sandbox service gateway.
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("Bad request: {0}")]
    BadRequest(ApiFailure),

    #[error("Not found: {0}")]
    NotFound(ApiFailure),

    #[error("Timed out: {0}")]
    Timeout(ApiFailure),

    #[error("Internal server error: {0}")]
    Internal(ApiFailure),

    #[error("API error: {0}")]
    Api(ApiFailure),

    #[error("Request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
}

impl SandboxError {
    /// Classify a non-2xx response by its status code.
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        let failure = ApiFailure::new(status, message, endpoint);
        match status {
            400 => SandboxError::BadRequest(failure),
            404 => SandboxError::NotFound(failure),
            504 => SandboxError::Timeout(failure),
            s if s >= 500 => SandboxError::Internal(failure),
            _ => SandboxError::Api(failure),
        }
    }

    /// A 2xx response that did not carry the fields the caller needs.
    pub fn malformed(
        status: u16,
        message: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        SandboxError::Api(ApiFailure::new(status, message, endpoint))
    }

    /// HTTP status of the failure, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        self.failure().map(|f| f.status)
    }

    /// Endpoint path the failing call targeted.
    pub fn endpoint(&self) -> &str {
        match self {
            SandboxError::Transport { endpoint, .. } => endpoint,
            other => other
                .failure()
                .map(|f| f.endpoint.as_str())
                .unwrap_or_default(),
        }
    }

    fn failure(&self) -> Option<&ApiFailure> {
        match self {
            SandboxError::BadRequest(f)
            | SandboxError::NotFound(f)
            | SandboxError::Timeout(f)
            | SandboxError::Internal(f)
            | SandboxError::Api(f) => Some(f),
            SandboxError::Transport { .. } => None,
        }
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("No content in LLM response")]
    EmptyResponse,
}

/// Errors raised while shaping a reward.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RewardError {
    #[error("Invalid reward parameter '{name}': {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Reward term '{term}' is not finite")]
    NonFinite { term: &'static str },
}

/// Errors that terminate a single rollout without producing a trajectory.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("Sandbox setup failed: {0}")]
    Setup(#[from] SandboxError),

    #[error("Model produced no usable completion after {attempts} attempts: {last}")]
    ModelExhausted { attempts: u32, last: LlmError },
}

/// Errors that can occur while synthesizing or validating tasks.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to parse model output: {0}")]
    Parse(String),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<SynthesisError>,
    },
}

/// Errors that can occur while persisting synthesis output.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {path} line {line}: {source}")]
    Corrupt {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading scenarios.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Split file not found: {0}")]
    SplitNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scenario in {path} line {line}: {source}")]
    InvalidRow {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that stop a synthesis pipeline run before any tier starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
