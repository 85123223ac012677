//! Bounded retries for provisioning calls
//!
//! Some setup calls race server-side state changes (a freshly mounted
//! engine that is still upgrading its storage, for example). The caller
//! names which errors mean "not yet"; anything else fails at once.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;

/// How many attempts to make and how long to wait between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    pub backoff: Backoff,

    /// Upper bound on any single wait
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Attempt `n` is followed by a wait of `n * step`
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear { step },
            max_delay: step.saturating_mul(max_attempts),
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
            max_delay: delay,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt, self.max_delay)
    }
}

/// Runs an operation under a [`RetryPolicy`]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `f` until it succeeds, `retry_if` rejects its error, or the
    /// attempts run out
    pub async fn execute_if<F, Fut, T, E, P>(&self, mut f: F, retry_if: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(attempts = attempt, "operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(error) if !retry_if(&error) => {
                    debug!(attempt, %error, "operation failed with a non-retryable error");
                    return Err(RetryError::Fatal(error));
                }
                Err(error) if attempt >= self.policy.max_attempts => {
                    warn!(attempts = attempt, %error, "giving up after max attempts");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(attempt, %error, delay_ms = delay.as_millis() as u64, "retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Fatal(error) => error,
        }
    }
}
