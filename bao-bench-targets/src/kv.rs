//! Static secrets: KV version 1 and version 2 read, write and list
//!
//! Setup mounts a fresh `kv` engine and seeds `secret-1` to `secret-<numkvs>`.
//! Reads and writes pick one of those secrets uniformly at random.

use async_trait::async_trait;
use bao_bench_config::AttackConfig;
use bao_bench_core::{
    decode_config, BenchmarkTest, BoundBenchmark, CleanupError, ConfigError, SetupError,
    TargetInfo,
};
use bao_bench_http::{HttpError, HttpMethod, RequestTemplate, VaultClient};
use bao_bench_resilience::{RetryExecutor, RetryPolicy};
use rand::RngCore;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::common::{kv_payload, mount_engine, pick, resource_name, rollback_mount, unmount_engine};

/// Returned while a fresh v2 mount migrates its storage
const UPGRADE_IN_PROGRESS: &str = "Upgrading from non-versioned to versioned data.";
const UPGRADE_MAX_ATTEMPTS: u32 = 100;
const UPGRADE_RETRY_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvVersion {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvAction {
    Read,
    Write,
    List,
}

impl KvAction {
    fn method(self) -> HttpMethod {
        match self {
            KvAction::Read => HttpMethod::Get,
            KvAction::Write => HttpMethod::Post,
            KvAction::List => HttpMethod::List,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KvConfig {
    /// Size in bytes of the value written by `*_write`
    pub kvsize: usize,
    /// Number of secrets seeded during setup
    pub numkvs: u32,
    /// List with `detailed-metadata` instead of `metadata` (v2 only)
    pub detailed: bool,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            kvsize: 1,
            numkvs: 1000,
            detailed: false,
        }
    }
}

pub struct KvTest {
    version: KvVersion,
    action: KvAction,
    config: KvConfig,
}

impl KvTest {
    pub fn new(version: KvVersion, action: KvAction) -> Self {
        Self {
            version,
            action,
            config: KvConfig::default(),
        }
    }

    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    fn secret_path(&self, mount: &str, n: u32) -> String {
        match self.version {
            KvVersion::V1 => format!("{}/secret-{}", mount, n),
            KvVersion::V2 => format!("{}/data/secret-{}", mount, n),
        }
    }

    /// A v2 mount rejects requests until its storage upgrade finishes
    async fn wait_for_upgrade(&self, client: &VaultClient, mount: &str) -> Result<(), SetupError> {
        let retry = RetryExecutor::new(RetryPolicy::linear(UPGRADE_MAX_ATTEMPTS, UPGRADE_RETRY_STEP));
        let config_path = format!("{}/config", mount);

        retry
            .execute_if(
                || client.read(&config_path),
                |e: &HttpError| e.mentions(UPGRADE_IN_PROGRESS),
            )
            .await
            .map(|_| ())
            .map_err(|e| SetupError::api("reading KVv2 configuration", e.into_inner()))
    }

    async fn seed(&self, client: &VaultClient, mount: &str) -> Result<(), SetupError> {
        trace!(mount = %mount, secrets = self.config.numkvs, "seeding secrets");
        let seed = serde_json::json!({ "data": { "foo": 1 } });
        for n in 1..=self.config.numkvs {
            client
                .write(&self.secret_path(mount, n), &seed)
                .await
                .map_err(|e| SetupError::api(format!("writing secret-{}", n), e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BenchmarkTest for KvTest {
    fn test_type(&self) -> &str {
        match (self.version, self.action) {
            (KvVersion::V1, KvAction::Read) => "kvv1_read",
            (KvVersion::V1, KvAction::Write) => "kvv1_write",
            (KvVersion::V1, KvAction::List) => "kvv1_list",
            (KvVersion::V2, KvAction::Read) => "kvv2_read",
            (KvVersion::V2, KvAction::Write) => "kvv2_write",
            (KvVersion::V2, KvAction::List) => "kvv2_list",
        }
    }

    fn parse_config(&mut self, raw: &serde_yaml::Value) -> Result<(), ConfigError> {
        let config: KvConfig = decode_config(raw)?;
        if config.numkvs == 0 {
            return Err(ConfigError::invalid_value("numkvs", "must be at least 1"));
        }
        if config.detailed && self.version == KvVersion::V1 {
            return Err(ConfigError::invalid_value(
                "detailed",
                "only supported by kvv2 list tests",
            ));
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
        let mount = resource_name(name, top);
        let options = match self.version {
            KvVersion::V1 => None,
            KvVersion::V2 => Some(BTreeMap::from([("version".to_string(), "2".to_string())])),
        };

        debug!(test_type = self.test_type(), mount = %mount, "mounting kv secrets engine");
        mount_engine(client, &mount, "kv", options).await?;

        let provisioned = async {
            if self.version == KvVersion::V2 {
                self.wait_for_upgrade(client, &mount).await?;
            }
            self.seed(client, &mount).await
        }
        .await;

        if let Err(error) = provisioned {
            rollback_mount(client, &mount).await;
            return Err(error);
        }

        Ok(Arc::new(BoundKv {
            version: self.version,
            action: self.action,
            base_url: client.api_url(&mount),
            path_prefix: format!("/v1/{}", mount),
            mount,
            headers: client.auth_headers(),
            numkvs: self.config.numkvs,
            payload: kv_payload(self.config.kvsize),
            detailed: self.config.detailed,
        }))
    }
}

#[derive(Debug)]
pub struct BoundKv {
    version: KvVersion,
    action: KvAction,
    mount: String,
    base_url: String,
    path_prefix: String,
    headers: HeaderMap,
    numkvs: u32,
    payload: String,
    detailed: bool,
}

impl BoundKv {
    fn secret_url(&self, n: u32) -> String {
        match self.version {
            KvVersion::V1 => format!("{}/secret-{}", self.base_url, n),
            KvVersion::V2 => format!("{}/data/secret-{}", self.base_url, n),
        }
    }

    fn list_url(&self) -> String {
        match (self.version, self.detailed) {
            (KvVersion::V1, _) => self.base_url.clone(),
            (KvVersion::V2, false) => format!("{}/metadata", self.base_url),
            (KvVersion::V2, true) => format!("{}/detailed-metadata", self.base_url),
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }
}

#[async_trait]
impl BoundBenchmark for BoundKv {
    fn target(&self, _client: &VaultClient, rng: &mut dyn RngCore) -> RequestTemplate {
        let headers = self.headers.clone();
        match self.action {
            KvAction::Read => {
                RequestTemplate::new(HttpMethod::Get, self.secret_url(pick(rng, self.numkvs)), headers)
            }
            KvAction::Write => {
                RequestTemplate::new(HttpMethod::Post, self.secret_url(pick(rng, self.numkvs)), headers)
                    .with_body(self.payload.clone())
            }
            KvAction::List => RequestTemplate::new(HttpMethod::List, self.list_url(), headers),
        }
    }

    fn describe(&self) -> TargetInfo {
        TargetInfo::new(self.action.method(), self.path_prefix.clone())
    }

    async fn cleanup(&self, client: &VaultClient) -> Result<(), CleanupError> {
        trace!(mount = %self.mount, "unmounting kv secrets engine");
        unmount_engine(client, &self.mount).await
    }
}
