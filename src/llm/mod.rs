//! LLM integration for shell-forge.
//!
//! The policy model that drives rollouts and the generator model that
//! synthesizes tasks are both reached through [`LlmProvider`], an async trait
//! over OpenAI-compatible chat completions.
//!
//! ```ignore
//! use shell_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("ls -la")])
//!     .with_max_tokens(512);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Role,
    Usage,
};
