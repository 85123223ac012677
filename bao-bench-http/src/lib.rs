//! HTTP client functionality for bao-bench
//!
//! This crate provides the OpenBao/Vault API client used during setup and
//! cleanup, plus the `RequestTemplate` type that benchmark targets hand to the
//! attack driver once per sampled request.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-export main types for convenience
pub use client::{MountInfo, VaultClient};
pub use config::HttpClientConfig;
pub use errors::HttpError;
pub use types::{HttpMethod, HttpMethodError, RequestTemplate};

/// Header carrying the client token
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// Header selecting the namespace a request runs in
pub const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
