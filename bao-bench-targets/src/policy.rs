//! ACL policy read, write and list
//!
//! Setup writes `policies` generated policies under
//! `sys/policies/acl/<name>/policy-<n>`; the attack reads, rewrites or lists
//! them.

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
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::common::{combine_cleanup, pick, resource_name};

const POLICY_ROOT: &str = "sys/policies/acl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Read,
    Write,
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Number of policies created during setup
    pub policies: u32,
    /// Length of every generated path rule
    pub path_length: usize,
    /// Path rules per policy
    pub paths: u32,
    pub capabilities: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policies: 10,
            path_length: 25,
            paths: 1,
            capabilities: ["create", "read", "update", "delete", "list", "sudo"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl PolicyConfig {
    /// HCL body with `paths` rules. Rule `i` is `i` padded with `a` to
    /// exactly `path_length` characters.
    pub fn render_policy(&self) -> String {
        let capabilities = self
            .capabilities
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut hcl = String::new();
        for i in 0..self.paths {
            let mut path = i.to_string();
            path.push_str(&"a".repeat(self.path_length));
            path.truncate(self.path_length);
            // Writing to a String cannot fail
            let _ = write!(
                hcl,
                "path \"{}\" {{\n  capabilities = [{}]\n}}\n",
                path, capabilities
            );
        }
        hcl
    }

    fn body(&self) -> String {
        serde_json::json!({ "policy": self.render_policy() }).to_string()
    }
}

pub struct PolicyTest {
    action: PolicyAction,
    config: PolicyConfig,
}

impl PolicyTest {
    pub fn new(action: PolicyAction) -> Self {
        Self {
            action,
            config: PolicyConfig::default(),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

#[async_trait]
impl BenchmarkTest for PolicyTest {
    fn test_type(&self) -> &str {
        match self.action {
            PolicyAction::Read => "acl_policy_read",
            PolicyAction::Write => "acl_policy_write",
            PolicyAction::List => "acl_policy_list",
        }
    }

    fn parse_config(&mut self, raw: &serde_yaml::Value) -> Result<(), ConfigError> {
        let config: PolicyConfig = decode_config(raw)?;
        if config.policies == 0 {
            return Err(ConfigError::invalid_value("policies", "must be at least 1"));
        }
        if config.paths == 0 {
            return Err(ConfigError::invalid_value("paths", "must be at least 1"));
        }
        if config.path_length == 0 {
            return Err(ConfigError::invalid_value("path_length", "must be at least 1"));
        }
        if config.capabilities.is_empty() {
            return Err(ConfigError::invalid_value(
                "capabilities",
                "at least one capability is required",
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
        let prefix = resource_name(name, top);
        let body = serde_json::json!({ "policy": self.config.render_policy() });

        debug!(
            test_type = self.test_type(),
            prefix = %prefix,
            policies = self.config.policies,
            "writing ACL policies"
        );

        let bound = BoundPolicy {
            action: self.action,
            base_url: client.api_url(&format!("{}/{}", POLICY_ROOT, prefix)),
            path_prefix: format!("/v1/{}/{}", POLICY_ROOT, prefix),
            prefix,
            headers: client.auth_headers(),
            policies: self.config.policies,
            body: self.config.body(),
        };

        for n in 1..=self.config.policies {
            if let Err(e) = client.write(&bound.policy_path(n), &body).await {
                // Remove what was written so far
                for written in (1..n).rev() {
                    if let Err(error) = client.delete(&bound.policy_path(written)).await {
                        warn!(policy = %bound.policy_path(written), %error, "failed to roll back policy");
                    }
                }
                return Err(SetupError::api(format!("writing policy-{}", n), e));
            }
        }

        Ok(Arc::new(bound))
    }
}

#[derive(Debug)]
pub struct BoundPolicy {
    action: PolicyAction,
    prefix: String,
    base_url: String,
    path_prefix: String,
    headers: HeaderMap,
    policies: u32,
    body: String,
}

impl BoundPolicy {
    fn policy_path(&self, n: u32) -> String {
        format!("{}/{}/policy-{}", POLICY_ROOT, self.prefix, n)
    }
}

#[async_trait]
impl BoundBenchmark for BoundPolicy {
    fn target(&self, _client: &VaultClient, rng: &mut dyn RngCore) -> RequestTemplate {
        let headers = self.headers.clone();
        match self.action {
            PolicyAction::Read => RequestTemplate::new(
                HttpMethod::Get,
                format!("{}/policy-{}", self.base_url, pick(rng, self.policies)),
                headers,
            ),
            PolicyAction::Write => RequestTemplate::new(
                HttpMethod::Post,
                format!("{}/policy-{}", self.base_url, pick(rng, self.policies)),
                headers,
            )
            .with_body(self.body.clone()),
            PolicyAction::List => {
                RequestTemplate::new(HttpMethod::List, self.base_url.clone(), headers)
            }
        }
    }

    fn describe(&self) -> TargetInfo {
        let method = match self.action {
            PolicyAction::Read => HttpMethod::Get,
            PolicyAction::Write => HttpMethod::Post,
            PolicyAction::List => HttpMethod::List,
        };
        TargetInfo::new(method, self.path_prefix.clone())
    }

    async fn cleanup(&self, client: &VaultClient) -> Result<(), CleanupError> {
        let mut results = Vec::with_capacity(self.policies as usize);
        for n in 1..=self.policies {
            let path = self.policy_path(n);
            let result = client
                .delete(&path)
                .await
                .map_err(|e| CleanupError::from_http(path, e));
            results.push(result);
        }
        combine_cleanup(
            &format!("{}/{}", POLICY_ROOT, self.prefix),
            self.policies as usize,
            results,
        )
    }
}
