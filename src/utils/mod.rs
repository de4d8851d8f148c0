//! Shared utility functions for shell-forge.

pub mod retry;

pub use retry::{attempt, RetryError};
