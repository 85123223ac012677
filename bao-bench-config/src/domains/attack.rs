//! Attack phase configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_positive_finite, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide attack settings, read-only once loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// How long requests are issued for
    #[serde(with = "humantime_serde", default = "default_duration")]
    pub duration: Duration,

    /// Target requests per second across all workers
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Number of concurrent request-issuing workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Replace human-provided resource names with fresh UUIDs so that
    /// parallel runs against one server do not collide
    #[serde(default = "crate::domains::utils::default_true")]
    pub random_mounts: bool,

    /// How long in-flight requests may drain after the attack stops
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub grace_period: Duration,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            rate: default_rate(),
            workers: default_workers(),
            random_mounts: true,
            grace_period: default_grace_period(),
        }
    }
}

impl AttackConfig {
    /// Interval between two consecutive request permits
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate)
    }
}

impl Validatable for AttackConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.duration.as_millis(), "duration", self.domain_name())?;
        validate_positive_finite(self.rate, "rate", self.domain_name())?;
        validate_positive(self.workers, "workers", self.domain_name())?;

        // Pacing intervals below a nanosecond cannot be represented
        if self.rate > 1_000_000_000.0 {
            return Err(self.validation_error(format!(
                "rate {} exceeds the supported maximum of 1e9 requests per second",
                self.rate
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "attack"
    }
}

fn default_duration() -> Duration {
    Duration::from_secs(10)
}

fn default_rate() -> f64 {
    10.0
}

fn default_workers() -> u32 {
    10
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}
