//! Domain-specific configuration modules

pub mod attack;
pub mod http;
pub mod logging;
pub mod report;
pub mod server;
pub mod tests;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main benchmark configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BenchConfig {
    /// Target server configuration
    #[serde(default)]
    pub server: server::ServerConfig,

    /// Attack phase configuration (rate, duration, workers)
    #[serde(default)]
    pub attack: attack::AttackConfig,

    /// HTTP client configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Report output configuration
    #[serde(default)]
    pub report: report::ReportConfig,

    /// Ordered list of weighted test definitions
    #[serde(default)]
    pub tests: Vec<tests::TestDefinition>,
}

impl BenchConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.attack.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        self.report.validate()?;
        tests::validate_definitions(&self.tests, self.attack.random_mounts)?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let mut config = BenchConfig::default();
        config.tests = tests::sample_definitions();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
