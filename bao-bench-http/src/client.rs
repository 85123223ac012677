//! OpenBao/Vault API client
//!
//! Setup and cleanup talk to the server through this client. The attack phase
//! only borrows its underlying `reqwest::Client` and authentication headers.

use crate::config::HttpClientConfig;
use crate::errors::HttpError;
use crate::types::{HttpMethod, RequestTemplate};
use crate::{NAMESPACE_HEADER, TOKEN_HEADER};
use bao_bench_config::ServerConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// A secrets engine or auth method as reported by `sys/mounts` / `sys/auth`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountInfo {
    #[serde(rename = "type")]
    pub mount_type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub options: Option<BTreeMap<String, String>>,
}

/// Client for the secrets-management HTTP API
#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    namespace: Option<String>,
    headers: HeaderMap,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    pub fn new(
        address: &str,
        token: Option<&str>,
        namespace: Option<&str>,
        config: &HttpClientConfig,
    ) -> Result<Self, HttpError> {
        let parsed = reqwest::Url::parse(address)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", address, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HttpError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                address
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(token)
                .map_err(|_| HttpError::InvalidHeader(TOKEN_HEADER.to_string()))?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static("x-vault-token"), value);
        }
        if let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) {
            let value = HeaderValue::from_str(namespace)
                .map_err(|_| HttpError::InvalidHeader(NAMESPACE_HEADER.to_string()))?;
            headers.insert(HeaderName::from_static("x-vault-namespace"), value);
        }

        debug!(
            address = %address,
            namespace = ?namespace,
            timeout_ms = config.timeout.as_millis() as u64,
            "creating API client"
        );

        Ok(Self {
            http: config.build_client()?,
            address: address.trim_end_matches('/').to_string(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            headers,
        })
    }

    pub fn from_config(server: &ServerConfig, http: &HttpClientConfig) -> Result<Self, HttpError> {
        Self::new(
            server.normalized_address(),
            server.token.as_deref(),
            server.namespace.as_deref(),
            http,
        )
    }

    /// Server address without trailing slash
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Underlying connection pool, shared with the attack driver
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Token and namespace headers attached to every request
    pub fn auth_headers(&self) -> HeaderMap {
        self.headers.clone()
    }

    /// Absolute URL for an API path, e.g. `sys/mounts` → `<addr>/v1/sys/mounts`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    /// Authenticated request template for an API path
    pub fn template(&self, method: HttpMethod, path: &str) -> RequestTemplate {
        RequestTemplate::new(method, self.api_url(path), self.auth_headers())
    }

    /// Issue a request and decode the JSON response body, if any.
    ///
    /// Non-success statuses become `HttpError::Api` carrying the server's
    /// `errors` array.
    pub async fn send(&self, template: &RequestTemplate) -> Result<Option<JsonValue>, HttpError> {
        trace!(method = %template.method, url = %template.url, "sending API request");
        let response = template.build(&self.http).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(HttpError::Api {
                status: status.as_u16(),
                errors: parse_errors(&bytes),
            });
        }

        if bytes.is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Read a path. A missing path is `Ok(None)`.
    pub async fn read(&self, path: &str) -> Result<Option<JsonValue>, HttpError> {
        match self.send(&self.template(HttpMethod::Get, path)).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }

    pub async fn write(&self, path: &str, body: &JsonValue) -> Result<Option<JsonValue>, HttpError> {
        let template = self
            .template(HttpMethod::Post, path)
            .with_body(serde_json::to_string(body)?);
        self.send(&template).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), HttpError> {
        self.send(&self.template(HttpMethod::Delete, path)).await?;
        Ok(())
    }

    /// List a path and return the raw `data` object. A missing path is `Ok(None)`.
    pub async fn list(&self, path: &str) -> Result<Option<JsonValue>, HttpError> {
        match self.send(&self.template(HttpMethod::List, path)).await {
            Ok(Some(JsonValue::Object(mut body))) => Ok(body.remove("data")),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Keys under a path; empty when the path does not exist
    pub async fn list_keys(&self, path: &str) -> Result<Vec<String>, HttpError> {
        let data = self.list(path).await?;
        Ok(data
            .as_ref()
            .and_then(|d| d.get("keys"))
            .and_then(JsonValue::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Enable a secrets engine at `path`
    pub async fn mount(
        &self,
        path: &str,
        mount_type: &str,
        options: Option<BTreeMap<String, String>>,
    ) -> Result<(), HttpError> {
        debug!(mount = %path, mount_type = %mount_type, "enabling secrets engine");
        let mut body = serde_json::json!({ "type": mount_type });
        if let Some(options) = options {
            body["options"] = serde_json::to_value(options)?;
        }
        self.write(&format!("sys/mounts/{}", path.trim_matches('/')), &body)
            .await?;
        Ok(())
    }

    pub async fn unmount(&self, path: &str) -> Result<(), HttpError> {
        debug!(mount = %path, "disabling secrets engine");
        self.delete(&format!("sys/mounts/{}", path.trim_matches('/')))
            .await
    }

    /// Secrets engines keyed by path (with trailing slash)
    pub async fn list_mounts(&self) -> Result<BTreeMap<String, MountInfo>, HttpError> {
        let body = self.read("sys/mounts").await?;
        Ok(parse_mount_table(body))
    }

    pub async fn enable_auth(&self, path: &str, auth_type: &str) -> Result<(), HttpError> {
        debug!(mount = %path, auth_type = %auth_type, "enabling auth method");
        self.write(
            &format!("sys/auth/{}", path.trim_matches('/')),
            &serde_json::json!({ "type": auth_type }),
        )
        .await?;
        Ok(())
    }

    pub async fn disable_auth(&self, path: &str) -> Result<(), HttpError> {
        debug!(mount = %path, "disabling auth method");
        self.delete(&format!("sys/auth/{}", path.trim_matches('/')))
            .await
    }

    /// Auth methods keyed by path (with trailing slash)
    pub async fn list_auth(&self) -> Result<BTreeMap<String, MountInfo>, HttpError> {
        let body = self.read("sys/auth").await?;
        Ok(parse_mount_table(body))
    }
}

/// Older servers put the table at the top level, newer ones under `data`.
fn parse_mount_table(body: Option<JsonValue>) -> BTreeMap<String, MountInfo> {
    let Some(body) = body else {
        return BTreeMap::new();
    };

    let table = match body {
        JsonValue::Object(mut map) => match map.remove("data") {
            Some(JsonValue::Object(data)) => data,
            _ => map,
        },
        _ => return BTreeMap::new(),
    };

    table
        .into_iter()
        .filter_map(|(path, info)| {
            serde_json::from_value::<MountInfo>(info)
                .ok()
                .map(|info| (path, info))
        })
        .collect()
}

fn parse_errors(body: &[u8]) -> Vec<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        errors: Vec<String>,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.errors,
        Err(_) if body.is_empty() => Vec::new(),
        Err(_) => vec![String::from_utf8_lossy(body).into_owned()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> VaultClient {
        VaultClient::new(
            &server.uri(),
            Some("root"),
            Some("team-a"),
            &HttpClientConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_address_rejected() {
        let config = HttpClientConfig::default();
        assert!(VaultClient::new("not a url", None, None, &config).is_err());
        assert!(VaultClient::new("ftp://bao:8200", None, None, &config).is_err());
    }

    #[test]
    fn test_api_url_and_headers() {
        let client = VaultClient::new(
            "http://127.0.0.1:8200/",
            Some("root"),
            None,
            &HttpClientConfig::default(),
        )
        .unwrap();
        assert_eq!(client.api_url("/sys/mounts"), "http://127.0.0.1:8200/v1/sys/mounts");
        let headers = client.auth_headers();
        assert_eq!(headers[TOKEN_HEADER], "root");
        assert!(headers.get(NAMESPACE_HEADER).is_none());
        assert!(!format!("{:?}", client).contains("root"));
    }

    #[tokio::test]
    async fn test_mount_sends_type_and_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/mounts/bench-kv"))
            .and(header("x-vault-token", "root"))
            .and(header("x-vault-namespace", "team-a"))
            .and(body_json(serde_json::json!({
                "type": "kv",
                "options": { "version": "2" }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let options = BTreeMap::from([("version".to_string(), "2".to_string())]);
        client.mount("bench-kv", "kv", Some(options)).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_errors_are_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/mounts/taken"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "errors": ["path is already in use at taken/"]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.mount("taken", "kv", None).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.mentions("already in use"));
    }

    #[tokio::test]
    async fn test_read_missing_path_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/secret-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({ "errors": [] })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.read("kv/secret-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_keys_uses_list_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/policies/acl"))
            .and(query_param("list", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "keys": ["default", "policy-1"] }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let keys = client.list_keys("sys/policies/acl").await.unwrap();
        assert_eq!(keys, vec!["default".to_string(), "policy-1".to_string()]);
        assert!(client.list_keys("sys/missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_mounts_reads_data_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/mounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "abc",
                "data": {
                    "secret/": { "type": "kv", "description": "", "options": { "version": "2" } },
                    "sys/": { "type": "system", "description": "system endpoints" }
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mounts = client.list_mounts().await.unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts["secret/"].mount_type, "kv");
        assert_eq!(mounts["sys/"].mount_type, "system");
    }

    #[test]
    fn test_parse_errors_falls_back_to_text() {
        assert_eq!(parse_errors(b"upstream down"), vec!["upstream down".to_string()]);
        assert!(parse_errors(b"").is_empty());
        assert_eq!(parse_errors(br#"{"errors":["x"]}"#), vec!["x".to_string()]);
    }
}
