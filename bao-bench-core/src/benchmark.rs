//! The capability every endpoint benchmark implements

use async_trait::async_trait;
use bao_bench_config::AttackConfig;
use bao_bench_http::{HttpMethod, RequestTemplate, VaultClient};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{CleanupError, ConfigError, SetupError};

/// What a bound benchmark sends, for attribution in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub method: HttpMethod,
    pub path_prefix: String,
}

impl TargetInfo {
    pub fn new(method: HttpMethod, path_prefix: impl Into<String>) -> Self {
        Self {
            method,
            path_prefix: path_prefix.into(),
        }
    }
}

impl fmt::Display for TargetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path_prefix)
    }
}

/// An endpoint benchmark before provisioning.
///
/// A fresh value is created per definition by the registry factory.
/// `parse_config` runs for every definition before any `setup` call, so
/// configuration mistakes never leave resources behind on the server.
#[async_trait]
pub trait BenchmarkTest: Send + Sync {
    /// Registry key, e.g. `kvv2_read`
    fn test_type(&self) -> &str;

    /// Decode and validate this definition's `config` block
    fn parse_config(&mut self, raw: &serde_yaml::Value) -> Result<(), ConfigError>;

    /// Create the server-side resources and return a bound target.
    ///
    /// When `top.random_mounts` is set, implementations substitute a fresh
    /// UUID for `name`. On failure they undo their own completed sub-steps;
    /// the caller never cleans up an instance whose setup failed.
    async fn setup(
        &self,
        client: &VaultClient,
        name: &str,
        top: &AttackConfig,
    ) -> Result<Arc<dyn BoundBenchmark>, SetupError>;
}

/// A provisioned benchmark, shared read-only by every attack worker
#[async_trait]
pub trait BoundBenchmark: Send + Sync {
    /// Build one request. Must not contact the server.
    fn target(&self, client: &VaultClient, rng: &mut dyn RngCore) -> RequestTemplate;

    fn describe(&self) -> TargetInfo;

    /// Remove everything `setup` created
    async fn cleanup(&self, client: &VaultClient) -> Result<(), CleanupError>;
}

/// Creates an unconfigured benchmark for one definition
pub type TestFactory = Box<dyn Fn() -> Box<dyn BenchmarkTest> + Send + Sync>;

/// Decode a collaborator's config block, treating a null block as empty
pub fn decode_config<T>(raw: &serde_yaml::Value) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    let value = if raw.is_null() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        raw.clone()
    };
    Ok(serde_yaml::from_value(value)?)
}
