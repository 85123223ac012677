//! Delay schedules between retry attempts

use std::time::Duration;

/// How long to wait after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay after every attempt
    Fixed(Duration),

    /// `step * attempt`, so the wait grows while a server finishes a
    /// background task
    Linear { step: Duration },
}

impl Backoff {
    /// Delay after the given failed attempt (1-indexed), never above `cap`
    pub fn delay(&self, attempt: u32, cap: Duration) -> Duration {
        let delay = match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { step } => step.saturating_mul(attempt),
        };
        delay.min(cap)
    }
}
