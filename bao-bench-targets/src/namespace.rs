//! Namespace creation: every request creates `<namespace_prefix>-<uuid>`
//! tagged with a per-definition source marker.

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
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::common::{combine_cleanup, random_uuid, resource_name};

const NAMESPACES_PATH: &str = "sys/namespaces";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceConfig {
    pub namespace_prefix: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: "benchmark".to_string(),
        }
    }
}

#[derive(Default)]
pub struct NamespaceTest {
    config: NamespaceConfig,
}

impl NamespaceTest {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BenchmarkTest for NamespaceTest {
    fn test_type(&self) -> &str {
        "namespace"
    }

    fn parse_config(&mut self, raw: &serde_yaml::Value) -> Result<(), ConfigError> {
        let config: NamespaceConfig = decode_config(raw)?;
        let prefix = config.namespace_prefix.trim();
        if prefix.is_empty() || prefix.contains('/') {
            return Err(ConfigError::invalid_value(
                "namespace_prefix",
                "must be a non-empty single path segment",
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
        let source = format!("benchmark-{}", resource_name(name, top));
        debug!(prefix = %self.config.namespace_prefix, source = %source, "namespace benchmark ready");

        Ok(Arc::new(BoundNamespace {
            base_url: client.api_url(NAMESPACES_PATH),
            headers: client.auth_headers(),
            prefix: self.config.namespace_prefix.clone(),
            body: serde_json::json!({ "source": source }).to_string(),
            source,
        }))
    }
}

#[derive(Debug)]
pub struct BoundNamespace {
    base_url: String,
    headers: HeaderMap,
    prefix: String,
    source: String,
    body: String,
}

impl BoundNamespace {
    /// Listed namespaces created by this definition. A namespace carrying
    /// another run's source marker is left alone; one without a marker is
    /// assumed ours.
    fn owned(&self, listing: Option<JsonValue>) -> Vec<String> {
        let Some(data) = listing else {
            return Vec::new();
        };
        let keys = data
            .get("keys")
            .and_then(JsonValue::as_array)
            .map(|keys| keys.iter().filter_map(JsonValue::as_str).collect::<Vec<_>>())
            .unwrap_or_default();

        keys.into_iter()
            .filter(|key| key.starts_with(&self.prefix))
            .filter(|key| {
                match data
                    .get("key_info")
                    .and_then(|info| info.get(*key))
                    .and_then(|info| info.get("source"))
                {
                    Some(source) => source.as_str() == Some(self.source.as_str()),
                    None => true,
                }
            })
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl BoundBenchmark for BoundNamespace {
    fn target(&self, _client: &VaultClient, rng: &mut dyn RngCore) -> RequestTemplate {
        let url = format!("{}/{}-{}", self.base_url, self.prefix, random_uuid(rng));
        RequestTemplate::new(HttpMethod::Post, url, self.headers.clone()).with_body(self.body.clone())
    }

    fn describe(&self) -> TargetInfo {
        TargetInfo::new(HttpMethod::Post, format!("/v1/{}", NAMESPACES_PATH))
    }

    async fn cleanup(&self, client: &VaultClient) -> Result<(), CleanupError> {
        trace!(prefix = %self.prefix, "cleaning namespaces");

        let listing = client
            .list(NAMESPACES_PATH)
            .await
            .map_err(|e| CleanupError::Api {
                resource: NAMESPACES_PATH.to_string(),
                source: e,
            })?;

        let owned = self.owned(listing);
        let mut results = Vec::with_capacity(owned.len());
        for key in &owned {
            let path = format!("{}/{}", NAMESPACES_PATH, key.trim_end_matches('/'));
            let removed = client.delete(&path).await;
            results.push(removed.map_err(|e| CleanupError::from_http(path, e)));
        }
        combine_cleanup(NAMESPACES_PATH, owned.len(), results)
    }
}
