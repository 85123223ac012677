//! Redis dynamic credentials through the database secrets engine
//!
//! Setup mounts `database`, registers the Redis connection and a role; each
//! request then generates a credential with `GET <mount>/creds/<role>`.

use async_trait::async_trait;
use bao_bench_config::AttackConfig;
use bao_bench_core::{
    decode_config, BenchmarkTest, BoundBenchmark, CleanupError, ConfigError, SetupError,
    TargetInfo,
};
use bao_bench_http::{HttpMethod, RequestTemplate, VaultClient};
use rand::RngCore;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::common::{mount_engine, resource_name, rollback_mount, unmount_engine};

pub const REDIS_USERNAME_ENV: &str = "BAO_BENCH_REDIS_USERNAME";
pub const REDIS_PASSWORD_ENV: &str = "BAO_BENCH_REDIS_PASSWORD";

/// Connection written to `<mount>/config/<name>`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisDbConfig {
    /// Connection name; part of the path, not the body
    #[serde(skip_serializing)]
    pub name: String,
    pub plugin_name: String,
    pub allowed_roles: Vec<String>,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_tls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_connection: Option<bool>,
}

impl Default for RedisDbConfig {
    fn default() -> Self {
        Self {
            name: "benchmark-redis-db".to_string(),
            plugin_name: "redis-database-plugin".to_string(),
            allowed_roles: vec!["my-*-role".to_string()],
            host: String::new(),
            port: 6379,
            username: None,
            password: None,
            tls: None,
            insecure_tls: None,
            ca_cert: None,
            verify_connection: None,
        }
    }
}

impl fmt::Debug for RedisDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisDbConfig")
            .field("name", &self.name)
            .field("plugin_name", &self.plugin_name)
            .field("allowed_roles", &self.allowed_roles)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .field("insecure_tls", &self.insecure_tls)
            .finish_non_exhaustive()
    }
}

/// Role written to `<mount>/roles/<name>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisRoleConfig {
    #[serde(skip_serializing)]
    pub name: String,
    pub db_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<String>,
    pub creation_statements: String,
}

impl Default for RedisRoleConfig {
    fn default() -> Self {
        Self {
            name: "my-dynamic-role".to_string(),
            db_name: "benchmark-redis-db".to_string(),
            default_ttl: None,
            max_ttl: None,
            creation_statements: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    pub db_connection: RedisDbConfig,
    pub role: RedisRoleConfig,
}

impl RedisConfig {
    /// Fill credentials from the environment and check required fields
    fn resolve(mut self) -> Result<Self, ConfigError> {
        let db = &mut self.db_connection;
        if db.username.as_deref().map_or(true, str::is_empty) {
            db.username = std::env::var(REDIS_USERNAME_ENV).ok().filter(|v| !v.is_empty());
        }
        if db.password.as_deref().map_or(true, str::is_empty) {
            db.password = std::env::var(REDIS_PASSWORD_ENV).ok().filter(|v| !v.is_empty());
        }

        if db.host.trim().is_empty() {
            return Err(ConfigError::MissingField("db_connection.host".to_string()));
        }
        if db.username.is_none() {
            return Err(ConfigError::invalid_value(
                "db_connection.username",
                format!("no redis username provided; set it or {}", REDIS_USERNAME_ENV),
            ));
        }
        if db.password.is_none() {
            return Err(ConfigError::invalid_value(
                "db_connection.password",
                format!("no redis password provided; set it or {}", REDIS_PASSWORD_ENV),
            ));
        }
        if self.role.creation_statements.trim().is_empty() {
            return Err(ConfigError::MissingField(
                "role.creation_statements".to_string(),
            ));
        }
        if self.role.name.trim().is_empty() {
            return Err(ConfigError::invalid_value("role.name", "must not be empty"));
        }
        Ok(self)
    }
}

#[derive(Default)]
pub struct RedisDynamicSecretTest {
    config: RedisConfig,
}

impl RedisDynamicSecretTest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn configure_engine(&self, client: &VaultClient, mount: &str) -> Result<(), SetupError> {
        let db = &self.config.db_connection;
        let db_body = serde_json::to_value(db).map_err(|e| SetupError::Failed(e.to_string()))?;
        trace!(mount = %mount, name = %db.name, "writing redis db config");
        client
            .write(&format!("{}/config/{}", mount, db.name), &db_body)
            .await
            .map_err(|e| SetupError::api("writing redis db config", e))?;

        let role = &self.config.role;
        let role_body = serde_json::to_value(role).map_err(|e| SetupError::Failed(e.to_string()))?;
        trace!(mount = %mount, name = %role.name, "writing redis role");
        client
            .write(&format!("{}/roles/{}", mount, role.name), &role_body)
            .await
            .map_err(|e| SetupError::api(format!("writing redis role '{}'", role.name), e))?;
        Ok(())
    }
}

#[async_trait]
impl BenchmarkTest for RedisDynamicSecretTest {
    fn test_type(&self) -> &str {
        "redis_dynamic_secret"
    }

    fn parse_config(&mut self, raw: &serde_yaml::Value) -> Result<(), ConfigError> {
        let config: RedisConfig = decode_config(raw)?;
        self.config = config.resolve()?;
        Ok(())
    }

    async fn setup(
        &self,
        client: &VaultClient,
        name: &str,
        top: &AttackConfig,
    ) -> Result<Arc<dyn BoundBenchmark>, SetupError> {
        let mount = resource_name(name, top);
        debug!(mount = %mount, db = ?self.config.db_connection, "mounting database secrets engine");
        mount_engine(client, &mount, "database", None).await?;

        if let Err(error) = self.configure_engine(client, &mount).await {
            rollback_mount(client, &mount).await;
            return Err(error);
        }

        Ok(Arc::new(BoundRedis {
            creds_url: client.api_url(&format!("{}/creds/{}", mount, self.config.role.name)),
            path_prefix: format!("/v1/{}", mount),
            headers: client.auth_headers(),
            mount,
        }))
    }
}

#[derive(Debug)]
pub struct BoundRedis {
    mount: String,
    creds_url: String,
    path_prefix: String,
    headers: HeaderMap,
}

#[async_trait]
impl BoundBenchmark for BoundRedis {
    fn target(&self, _client: &VaultClient, _rng: &mut dyn RngCore) -> RequestTemplate {
        RequestTemplate::new(HttpMethod::Get, self.creds_url.clone(), self.headers.clone())
    }

    fn describe(&self) -> TargetInfo {
        TargetInfo::new(HttpMethod::Get, self.path_prefix.clone())
    }

    async fn cleanup(&self, client: &VaultClient) -> Result<(), CleanupError> {
        unmount_engine(client, &self.mount).await
    }
}
