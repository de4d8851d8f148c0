//! HTTP client for the sandbox service.
//!
//! Every operation issues exactly one request with a fixed timeout. Non-2xx
//! responses and 2xx responses missing required fields are mapped to a typed
//! [`SandboxError`] carrying the status, message and endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{
    CommandHistory, ExecOutcome, SandboxInfo, SandboxTrajectory, TrajectoryFormat,
};
use crate::error::{ApiFailure, SandboxError};

/// Timeout applied to every sandbox operation.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for the liveness probe made at connection time.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations offered by the sandbox service.
#[async_trait]
pub trait SandboxService: Send + Sync {
    /// Register a new sandbox; does not start a container.
    async fn create_sandbox(
        &self,
        image: &str,
        setup_commands: &[String],
    ) -> Result<String, SandboxError>;

    /// Start the container and run its setup commands.
    async fn start_sandbox(&self, id: &str) -> Result<(), SandboxError>;

    /// Execute a command. `standalone` commands run outside the session and
    /// are not part of its visible history.
    async fn exec_command(
        &self,
        id: &str,
        command: &str,
        standalone: bool,
    ) -> Result<ExecOutcome, SandboxError>;

    async fn stop_sandbox(&self, id: &str, remove: bool) -> Result<(), SandboxError>;

    async fn get_trajectory(
        &self,
        id: &str,
        format: TrajectoryFormat,
    ) -> Result<SandboxTrajectory, SandboxError>;

    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>, SandboxError>;
}

/// Client for the sandbox service HTTP API.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    base_url: String,
    http_client: Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecResponse {
    output: Option<String>,
    exit_code: Option<i64>,
    exited: Option<bool>,
}

impl SandboxClient {
    /// Create a client without probing the service.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SandboxError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http_client = Client::builder()
            .build()
            .map_err(|e| SandboxError::Transport {
                endpoint: base_url.clone(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url,
            http_client,
            timeout: REQUEST_TIMEOUT,
        })
    }

    /// Create a client and verify the service answers `GET /health`.
    pub async fn connect(base_url: impl Into<String>) -> Result<Self, SandboxError> {
        let client = Self::new(base_url)?;
        client.health().await?;
        tracing::debug!(base_url = %client.base_url, "Sandbox service is healthy");
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe.
    pub async fn health(&self) -> Result<(), SandboxError> {
        self.send(Method::GET, "/health", None, None, HEALTH_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, SandboxError> {
        self.send(method, path, body, None, self.timeout).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        context: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, SandboxError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http_client.request(method, &url).timeout(timeout);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SandboxError::Timeout(ApiFailure::new(
                    504,
                    format!("request timed out after {}s", timeout.as_secs()),
                    path,
                ))
            } else {
                SandboxError::Transport {
                    endpoint: path.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.trim();
            let message = match context {
                Some(ctx) => format!("{}: {}", ctx, text),
                None => text.to_string(),
            };
            return Err(SandboxError::from_status(status.as_u16(), message, path));
        }

        Ok(response)
    }

    /// Read a 2xx body and decode it, mapping failures to a malformed-response error.
    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: Response,
        path: &str,
    ) -> Result<(u16, String, T), SandboxError> {
        let status = response.status().as_u16();
        let text = read_text(response, path).await?;
        let parsed = serde_json::from_str(&text).map_err(|e| {
            SandboxError::malformed(status, format!("Invalid response body ({}): {}", e, text), path)
        })?;
        Ok((status, text, parsed))
    }
}

async fn read_text(response: Response, path: &str) -> Result<String, SandboxError> {
    response.text().await.map_err(|e| SandboxError::Transport {
        endpoint: path.to_string(),
        message: format!("Failed to read response body: {}", e),
    })
}

#[async_trait]
impl SandboxService for SandboxClient {
    async fn create_sandbox(
        &self,
        image: &str,
        setup_commands: &[String],
    ) -> Result<String, SandboxError> {
        let path = "/sandboxes";
        let payload = json!({ "image": image, "setup_commands": setup_commands });
        let response = self.request(Method::POST, path, Some(payload)).await?;
        let (status, text, parsed): (u16, String, CreateResponse) =
            Self::read_json(response, path).await?;

        parsed.id.ok_or_else(|| {
            SandboxError::malformed(status, format!("Missing id in response: {}", text), path)
        })
    }

    async fn start_sandbox(&self, id: &str) -> Result<(), SandboxError> {
        let path = format!("/sandboxes/{}/start", id);
        self.request(Method::POST, &path, None).await.map(|_| ())
    }

    async fn exec_command(
        &self,
        id: &str,
        command: &str,
        standalone: bool,
    ) -> Result<ExecOutcome, SandboxError> {
        let path = format!("/sandboxes/{}/exec", id);
        let payload = json!({ "command": command, "standalone": standalone });
        let context = format!("command={}", command);
        let response = self
            .send(Method::POST, &path, Some(payload), Some(&context), self.timeout)
            .await?;
        let (status, text, parsed): (u16, String, ExecResponse) =
            Self::read_json(response, &path).await?;

        match (parsed.output, parsed.exit_code, parsed.exited) {
            (Some(output), Some(exit_code), Some(exited)) => Ok(ExecOutcome {
                output,
                exit_code,
                exited,
            }),
            _ => Err(SandboxError::malformed(
                status,
                format!("Missing fields in response: {}", text),
                path,
            )),
        }
    }

    async fn stop_sandbox(&self, id: &str, remove: bool) -> Result<(), SandboxError> {
        let path = format!("/sandboxes/{}/stop", id);
        self.request(Method::POST, &path, Some(json!({ "remove": remove })))
            .await
            .map(|_| ())
    }

    async fn get_trajectory(
        &self,
        id: &str,
        format: TrajectoryFormat,
    ) -> Result<SandboxTrajectory, SandboxError> {
        match format {
            TrajectoryFormat::Formatted => {
                let path = format!("/sandboxes/{}/trajectory/formatted", id);
                let response = self.request(Method::GET, &path, None).await?;
                Ok(SandboxTrajectory::Formatted(read_text(response, &path).await?))
            }
            TrajectoryFormat::Structured => {
                let path = format!("/sandboxes/{}/trajectory", id);
                let response = self.request(Method::GET, &path, None).await?;
                let (_, _, history): (u16, String, CommandHistory) =
                    Self::read_json(response, &path).await?;
                Ok(SandboxTrajectory::Structured(history))
            }
        }
    }

    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>, SandboxError> {
        let path = "/sandboxes";
        let response = self.request(Method::GET, path, None).await?;
        let (_, _, sandboxes): (u16, String, Vec<SandboxInfo>) =
            Self::read_json(response, path).await?;
        Ok(sandboxes)
    }
}
