//! Scripted test doubles for the model and the sandbox service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ApiFailure, LlmError, SandboxError};
use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use crate::sandbox::{
    CommandEntry, CommandHistory, ExecOutcome, SandboxInfo, SandboxService, SandboxTrajectory,
    TrajectoryFormat,
};

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Normal completion.
    Content(String),
    /// Completion that used the whole token allowance.
    Truncated(String),
    /// Blank content.
    Empty,
    Fail(LlmError),
}

/// Mock LLM provider that replays a queue of replies.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same content.
    pub fn always(content: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(content)
    }

    /// Content returned once the queue is drained. Without a fallback the
    /// mock answers with blank content.
    pub fn with_fallback(mut self, content: impl Into<String>) -> Self {
        self.fallback = Some(content.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("lock poisoned").len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }
}

fn response(content: String, completion_tokens: u32) -> GenerationResponse {
    GenerationResponse {
        id: "mock-id".to_string(),
        model: "mock-model".to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(content),
            finish_reason: Some("stop".to_string()),
        }],
        usage: Usage {
            prompt_tokens: 10,
            completion_tokens,
            total_tokens: 10 + completion_tokens,
        },
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let max_tokens = request.max_tokens.unwrap_or(512);
        self.requests.lock().expect("lock poisoned").push(request);

        let next = self.replies.lock().expect("lock poisoned").pop_front();
        match next {
            Some(Reply::Content(content)) => Ok(response(content, 1)),
            Some(Reply::Truncated(content)) => Ok(response(content, max_tokens)),
            Some(Reply::Empty) => Ok(response(String::new(), 0)),
            Some(Reply::Fail(e)) => Err(e),
            None => Ok(response(self.fallback.clone().unwrap_or_default(), 1)),
        }
    }
}

/// An exec request as seen by [`MockSandbox`].
#[derive(Debug, Clone)]
pub struct ExecCall {
    pub sandbox_id: String,
    /// Setup commands the sandbox was created with.
    pub setup_commands: Vec<String>,
    pub command: String,
    pub standalone: bool,
}

type ExecHandler = Box<dyn Fn(&ExecCall) -> Result<ExecOutcome, SandboxError> + Send + Sync>;

/// In-memory sandbox service that records every call.
///
/// By default `exit 0` ends the session, standalone commands exit 1 and any
/// other command prints `ok` and exits 0.
pub struct MockSandbox {
    next_id: AtomicUsize,
    created: Mutex<Vec<(String, Vec<String>)>>,
    started: Mutex<Vec<String>>,
    execs: Mutex<Vec<ExecCall>>,
    stops: Mutex<Vec<(String, bool)>>,
    handler: ExecHandler,
    fail_create: bool,
    fail_start: bool,
    fail_stop: bool,
}

fn default_exec(call: &ExecCall) -> Result<ExecOutcome, SandboxError> {
    if call.command.trim() == "exit 0" {
        Ok(ExecOutcome::new("", 0, true))
    } else if call.standalone {
        Ok(ExecOutcome::new("", 1, false))
    } else {
        Ok(ExecOutcome::new("ok", 0, false))
    }
}

impl MockSandbox {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            handler: Box::new(default_exec),
            fail_create: false,
            fail_start: false,
            fail_stop: false,
        }
    }

    pub fn with_exec<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExecCall) -> Result<ExecOutcome, SandboxError> + Send + Sync + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn created(&self) -> Vec<(String, Vec<String>)> {
        self.created.lock().expect("lock poisoned").clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().expect("lock poisoned").clone()
    }

    pub fn execs(&self) -> Vec<ExecCall> {
        self.execs.lock().expect("lock poisoned").clone()
    }

    pub fn stops(&self) -> Vec<(String, bool)> {
        self.stops.lock().expect("lock poisoned").clone()
    }

    fn setup_of(&self, id: &str) -> Option<Vec<String>> {
        self.created
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|(sid, _)| sid == id)
            .map(|(_, setup)| setup.clone())
    }

    fn not_found(id: &str, endpoint: String) -> SandboxError {
        SandboxError::NotFound(ApiFailure::new(
            404,
            format!("Sandbox {} not found", id),
            endpoint,
        ))
    }

    fn session_commands(&self, id: &str) -> Vec<String> {
        self.execs
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|c| c.sandbox_id == id && !c.standalone)
            .map(|c| c.command.clone())
            .collect()
    }
}

#[async_trait]
impl SandboxService for MockSandbox {
    async fn create_sandbox(
        &self,
        _image: &str,
        setup_commands: &[String],
    ) -> Result<String, SandboxError> {
        if self.fail_create {
            return Err(SandboxError::from_status(500, "create failed", "/sandboxes"));
        }
        let id = format!("sb-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created
            .lock()
            .expect("lock poisoned")
            .push((id.clone(), setup_commands.to_vec()));
        Ok(id)
    }

    async fn start_sandbox(&self, id: &str) -> Result<(), SandboxError> {
        let endpoint = format!("/sandboxes/{}/start", id);
        if self.setup_of(id).is_none() {
            return Err(Self::not_found(id, endpoint));
        }
        if self.fail_start {
            return Err(SandboxError::from_status(
                400,
                "setup command exited with 1",
                endpoint,
            ));
        }
        self.started.lock().expect("lock poisoned").push(id.to_string());
        Ok(())
    }

    async fn exec_command(
        &self,
        id: &str,
        command: &str,
        standalone: bool,
    ) -> Result<ExecOutcome, SandboxError> {
        let setup_commands = self
            .setup_of(id)
            .ok_or_else(|| Self::not_found(id, format!("/sandboxes/{}/exec", id)))?;
        let call = ExecCall {
            sandbox_id: id.to_string(),
            setup_commands,
            command: command.to_string(),
            standalone,
        };
        self.execs.lock().expect("lock poisoned").push(call.clone());
        (self.handler)(&call)
    }

    async fn stop_sandbox(&self, id: &str, remove: bool) -> Result<(), SandboxError> {
        self.stops
            .lock()
            .expect("lock poisoned")
            .push((id.to_string(), remove));
        if self.fail_stop {
            return Err(SandboxError::from_status(
                500,
                "stop failed",
                format!("/sandboxes/{}/stop", id),
            ));
        }
        Ok(())
    }

    async fn get_trajectory(
        &self,
        id: &str,
        format: TrajectoryFormat,
    ) -> Result<SandboxTrajectory, SandboxError> {
        let commands = self.session_commands(id);
        Ok(match format {
            TrajectoryFormat::Formatted => SandboxTrajectory::Formatted(
                commands
                    .iter()
                    .map(|c| format!("$ {}", c))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            TrajectoryFormat::Structured => SandboxTrajectory::Structured(CommandHistory {
                sandbox_id: id.to_string(),
                command_count: commands.len(),
                trajectory: commands
                    .into_iter()
                    .enumerate()
                    .map(|(index, command)| CommandEntry {
                        index,
                        command,
                        timestamp: index as f64,
                        result: None,
                    })
                    .collect(),
            }),
        })
    }

    async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>, SandboxError> {
        let stops = self.stops();
        Ok(self
            .created()
            .into_iter()
            .map(|(id, setup)| SandboxInfo {
                status: if stops.iter().any(|(sid, _)| *sid == id) {
                    "stopped".to_string()
                } else {
                    "running".to_string()
                },
                session_command_count: self.session_commands(&id).len(),
                id,
                image: "mock".to_string(),
                setup_commands: setup.join("\n"),
                last_standalone_exit_code: None,
            })
            .collect())
    }
}
