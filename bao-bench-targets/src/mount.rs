//! Mount churn: every request enables a new secrets engine or auth method
//! under a per-definition prefix.
//!
//! Nothing is created during setup. Cleanup lists the mount table and removes
//! every entry of the configured plugin type below the prefix.

use async_trait::async_trait;
use bao_bench_config::AttackConfig;
use bao_bench_core::{
    decode_config, BenchmarkTest, BoundBenchmark, CleanupError, ConfigError, SetupError,
    TargetInfo,
};
use bao_bench_http::{HttpMethod, MountInfo, RequestTemplate, VaultClient};
use rand::RngCore;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::common::{combine_cleanup, random_uuid, resource_name};

/// Which mount table requests go to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Secrets engines, `sys/mounts`
    Secret,
    /// Auth methods, `sys/auth`
    Auth,
}

impl MountKind {
    fn table(self) -> &'static str {
        match self {
            MountKind::Secret => "mounts",
            MountKind::Auth => "auth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountConfig {
    pub mount_type: MountKind,
    /// Engine or auth method type, e.g. `kv-v2` or `userpass`
    pub plugin: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_type: MountKind::Secret,
            plugin: "kv-v2".to_string(),
        }
    }
}

#[derive(Default)]
pub struct MountTest {
    config: MountConfig,
}

impl MountTest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }
}

#[async_trait]
impl BenchmarkTest for MountTest {
    fn test_type(&self) -> &str {
        "mount"
    }

    fn parse_config(&mut self, raw: &serde_yaml::Value) -> Result<(), ConfigError> {
        // An unknown mount_type fails to decode into MountKind
        let config: MountConfig = decode_config(raw)?;
        if config.plugin.trim().is_empty() {
            return Err(ConfigError::invalid_value("plugin", "must not be empty"));
        }
        self.config = config;
        Ok(())
    }

    async fn setup(
        &self,
        client: &VaultClient,
        name: &str,
        top: &AttackConfig,
    ) -> Result<Arc<dyn BoundBenchmark>, SetupError> {
        let prefix = resource_name(name, top);
        let table_path = format!("sys/{}/{}", self.config.mount_type.table(), prefix);
        debug!(prefix = %prefix, plugin = %self.config.plugin, "mount benchmark ready");

        Ok(Arc::new(BoundMount {
            kind: self.config.mount_type,
            plugin: self.config.plugin.clone(),
            base_url: client.api_url(&table_path),
            path_prefix: format!("/v1/{}", table_path),
            body: serde_json::json!({ "type": self.config.plugin }).to_string(),
            headers: client.auth_headers(),
            prefix,
        }))
    }
}

#[derive(Debug)]
pub struct BoundMount {
    kind: MountKind,
    plugin: String,
    prefix: String,
    base_url: String,
    path_prefix: String,
    body: String,
    headers: HeaderMap,
}

impl BoundMount {
    /// Mount table paths this benchmark created
    ///
    /// Matched on the `<prefix>/<plugin>-` path shape that `target` produces.
    /// The reported type is not compared: the server normalizes some plugins,
    /// listing `kv-v2` as `kv` with `options.version = "2"`.
    fn owned(&self, table: BTreeMap<String, MountInfo>) -> Vec<String> {
        let created = format!("{}/{}-", self.prefix, self.plugin);
        table
            .into_keys()
            .filter(|path| path.starts_with(&created))
            .collect()
    }
}

#[async_trait]
impl BoundBenchmark for BoundMount {
    fn target(&self, _client: &VaultClient, rng: &mut dyn RngCore) -> RequestTemplate {
        let url = format!("{}/{}-{}", self.base_url, self.plugin, random_uuid(rng));
        RequestTemplate::new(HttpMethod::Post, url, self.headers.clone()).with_body(self.body.clone())
    }

    fn describe(&self) -> TargetInfo {
        TargetInfo::new(HttpMethod::Post, self.path_prefix.clone())
    }

    async fn cleanup(&self, client: &VaultClient) -> Result<(), CleanupError> {
        trace!(prefix = %self.path_prefix, "cleaning mounts");

        let table = match self.kind {
            MountKind::Secret => client.list_mounts().await,
            MountKind::Auth => client.list_auth().await,
        }
        .map_err(|e| CleanupError::Api {
            resource: format!("sys/{}", self.kind.table()),
            source: e,
        })?;

        let owned = self.owned(table);
        let mut results = Vec::with_capacity(owned.len());
        for path in &owned {
            let removed = match self.kind {
                MountKind::Secret => client.unmount(path).await,
                MountKind::Auth => client.disable_auth(path).await,
            };
            results.push(removed.map_err(|e| CleanupError::from_http(format!("mount {}", path), e)));
        }

        debug!(prefix = %self.prefix, removed = owned.len(), "mount cleanup finished");
        combine_cleanup(&self.path_prefix, owned.len(), results)
    }
}
