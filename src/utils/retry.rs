//! Bounded retry combinator.
//!
//! Retry sites call [`attempt`] explicitly with their attempt budget; the
//! operation is re-invoked until it succeeds or the budget is spent, and the
//! last error is returned as a typed [`RetryError`].

use std::fmt;
use std::future::Future;

/// Error returned when every attempt failed.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Number of attempts that were made.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {} attempts: {}", self.attempts, self.last)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Run `op` up to `max_attempts` times (at least once).
///
/// `op` receives the 1-based attempt number. Failures before the last attempt
/// are logged at `warn` under `label`.
pub async fn attempt<T, E, F, Fut>(
    max_attempts: u32,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "{} failed, retrying...",
                    label
                );
            }
            Err(e) => {
                return Err(RetryError {
                    attempts: attempt,
                    last: e,
                })
            }
        }
    }
}
