//! Request execution seam for the attack driver

use async_trait::async_trait;
use bao_bench_http::RequestTemplate;
use tracing::trace;

use crate::error::AttackError;

/// What came back for one request. Any HTTP response counts, whatever its
/// status; the driver decides success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status: u16,
    pub bytes_in: u64,
}

#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: RequestTemplate) -> Result<ResponseSummary, AttackError>;
}

/// Issues requests over a shared reqwest connection pool
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestExecutor for ReqwestExecutor {
    async fn execute(&self, request: RequestTemplate) -> Result<ResponseSummary, AttackError> {
        let response = request
            .build(&self.client)
            .send()
            .await
            .map_err(|e| AttackError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        // Drain the body so the connection returns to the pool
        let body = response
            .bytes()
            .await
            .map_err(|e| AttackError::from_reqwest(&e))?;

        trace!(status, bytes = body.len(), "response received");
        Ok(ResponseSummary {
            status,
            bytes_in: body.len() as u64,
        })
    }
}
