//! Target server configuration

use crate::error::ConfigResult;
use crate::validation::{validate_url, Validatable};
use serde::{Deserialize, Serialize};

/// Connection details for the secrets-management server under test
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base address, e.g. `http://127.0.0.1:8200`
    #[serde(default = "default_address")]
    pub address: String,

    /// Token sent as `X-Vault-Token`. Never written back out.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Namespace sent as `X-Vault-Namespace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: None,
            namespace: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl ServerConfig {
    /// Address without a trailing slash so paths can be appended directly
    pub fn normalized_address(&self) -> &str {
        self.address.trim_end_matches('/')
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.address, "address", self.domain_name())?;

        if let Some(ref token) = self.token {
            if token.trim().is_empty() {
                return Err(self.validation_error("token cannot be blank when set"));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "server"
    }
}

fn default_address() -> String {
    "http://127.0.0.1:8200".to_string()
}
