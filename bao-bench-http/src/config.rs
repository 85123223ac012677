//! HTTP configuration

use crate::errors::HttpError;
use bao_bench_config::HttpConfig as ConfigHttpConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify TLS certificates
    pub verify_ssl: bool,

    /// Maximum idle connections kept per host
    pub pool_max_idle_per_host: usize,

    /// How long idle connections are kept
    pub pool_idle_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        ConfigHttpConfig::default().into()
    }
}

impl HttpClientConfig {
    /// Size the idle pool for `workers` concurrent callers unless the
    /// configuration already pins it
    pub fn for_workers(mut self, workers: usize) -> Self {
        if self.pool_max_idle_per_host == 0 {
            self.pool_max_idle_per_host = workers.max(1);
        }
        self
    }

    pub fn build_client(&self) -> Result<reqwest::Client, HttpError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .danger_accept_invalid_certs(!self.verify_ssl)
            .pool_idle_timeout(self.pool_idle_timeout);

        if self.pool_max_idle_per_host > 0 {
            builder = builder.pool_max_idle_per_host(self.pool_max_idle_per_host);
        }

        builder
            .build()
            .map_err(|e| HttpError::ConfigError(format!("failed to build HTTP client: {}", e)))
    }
}

impl From<ConfigHttpConfig> for HttpClientConfig {
    fn from(config: ConfigHttpConfig) -> Self {
        Self {
            timeout: config.timeout,
            connect_timeout: config.connection_pool.connection_timeout,
            user_agent: config.user_agent,
            verify_ssl: config.verify_ssl,
            pool_max_idle_per_host: config.connection_pool.max_idle_per_host,
            pool_idle_timeout: config.connection_pool.idle_timeout,
        }
    }
}
