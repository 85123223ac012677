//! Configuration loading and environment variable handling

use crate::domains::BenchConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with the `BAO_BENCH` prefix
    pub fn new() -> Self {
        Self {
            prefix: "BAO_BENCH".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides, then validate
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<BenchConfig> {
        let config = self.parse_file(path)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from YAML text with environment overrides, then validate
    pub fn from_yaml(&self, content: &str) -> ConfigResult<BenchConfig> {
        let config = self.parse_yaml(content)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Read and apply environment overrides without validating, so callers can
    /// layer command line flags on top before calling `validate_all`
    pub fn parse_file(&self, path: impl AsRef<Path>) -> ConfigResult<BenchConfig> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading benchmark configuration");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_yaml(&content)
    }

    pub fn parse_yaml(&self, content: &str) -> ConfigResult<BenchConfig> {
        let mut config: BenchConfig = if content.trim().is_empty() {
            BenchConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut BenchConfig) -> ConfigResult<()> {
        self.apply_server_overrides(&mut config.server)?;
        self.apply_attack_overrides(&mut config.attack)?;
        self.apply_http_overrides(&mut config.http)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Server overrides. The prefixed variable wins, then the conventional
    /// `VAULT_*` and `BAO_*` client variables.
    fn apply_server_overrides(
        &self,
        config: &mut crate::domains::server::ServerConfig,
    ) -> ConfigResult<()> {
        if let Some(address) = self.lookup_with_fallback("ADDRESS", &["VAULT_ADDR", "BAO_ADDR"]) {
            config.address = address;
        }

        if let Some(token) = self.lookup_with_fallback("TOKEN", &["VAULT_TOKEN", "BAO_TOKEN"]) {
            config.token = Some(token);
        }

        if let Some(namespace) =
            self.lookup_with_fallback("NAMESPACE", &["VAULT_NAMESPACE", "BAO_NAMESPACE"])
        {
            config.namespace = Some(namespace);
        }

        Ok(())
    }

    /// Apply attack config overrides
    fn apply_attack_overrides(
        &self,
        config: &mut crate::domains::attack::AttackConfig,
    ) -> ConfigResult<()> {
        if let Ok(duration) = self.get_env_var("DURATION") {
            config.duration = parse_duration_var("DURATION", &duration)?;
        }

        if let Ok(rate) = self.get_env_var("RATE") {
            config.rate = rate
                .parse()
                .map_err(|e| ConfigError::Env(format!("Invalid RATE: {}", e)))?;
        }

        if let Ok(workers) = self.get_env_var("WORKERS") {
            config.workers = workers
                .parse()
                .map_err(|e| ConfigError::Env(format!("Invalid WORKERS: {}", e)))?;
        }

        if let Ok(random_mounts) = self.get_env_var("RANDOM_MOUNTS") {
            config.random_mounts = random_mounts
                .parse()
                .map_err(|e| ConfigError::Env(format!("Invalid RANDOM_MOUNTS: {}", e)))?;
        }

        Ok(())
    }

    /// Apply HTTP config overrides
    fn apply_http_overrides(
        &self,
        config: &mut crate::domains::http::HttpConfig,
    ) -> ConfigResult<()> {
        if let Ok(timeout) = self.get_env_var("HTTP_TIMEOUT") {
            config.timeout = parse_duration_var("HTTP_TIMEOUT", &timeout)?;
        }

        if let Ok(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Ok(verify_ssl) = self.get_env_var("HTTP_VERIFY_SSL") {
            config.verify_ssl = verify_ssl
                .parse()
                .map_err(|e| ConfigError::Env(format!("Invalid HTTP_VERIFY_SSL: {}", e)))?;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::Env(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::Env(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }

    fn lookup_with_fallback(&self, name: &str, fallbacks: &[&str]) -> Option<String> {
        self.get_env_var(name)
            .ok()
            .or_else(|| fallbacks.iter().find_map(|var| std::env::var(var).ok()))
            .filter(|value| !value.is_empty())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_duration_var(name: &str, value: &str) -> ConfigResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::Env(format!("Invalid {}: {}", name, e)))
}
