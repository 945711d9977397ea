//! Remote audit-status query: asks a receiving node for its own view of a
//! bundle's delivery map. The protocol is symmetric; the serving side lives
//! in `crate::http`.

use crate::endpoints::Endpoint;
use crate::model::AuditHistory;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

pub const AUDIT_STATUS_PATH: &str = "/api/auditPublishing/get";

/// Boundary for querying a remote node's audit view. Swapped out for a
/// scripted fake in tests.
#[async_trait]
pub trait AuditStatusClient: Send + Sync {
    /// Fetch the remote node's audit history for `bundle_id`. `Ok(None)`
    /// means the node has no record of the bundle (not an error).
    async fn remote_history(
        &self,
        endpoint: &Endpoint,
        bundle_id: &str,
    ) -> Result<Option<AuditHistory>>;
}

/// reqwest-backed client with a hard per-call timeout so one unresponsive
/// endpoint cannot stall the reconciliation pass.
#[derive(Debug, Clone)]
pub struct HttpAuditClient {
    http: Client,
}

impl HttpAuditClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("pushqueue/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .context("failed to build audit status client")?;
        Ok(HttpAuditClient { http })
    }
}

#[async_trait]
impl AuditStatusClient for HttpAuditClient {
    async fn remote_history(
        &self,
        endpoint: &Endpoint,
        bundle_id: &str,
    ) -> Result<Option<AuditHistory>> {
        let url = format!(
            "{}{}/{}",
            endpoint.base_url.trim_end_matches('/'),
            AUDIT_STATUS_PATH,
            bundle_id
        );
        let res = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach endpoint {}", endpoint.id))?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(anyhow!(
                "audit status query to {} returned {}",
                endpoint.id,
                res.status()
            ));
        }

        let body = res
            .text()
            .await
            .with_context(|| format!("failed to read audit response from {}", endpoint.id))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let history: AuditHistory = serde_json::from_str(&body)
            .with_context(|| format!("malformed audit snapshot from {}", endpoint.id))?;
        Ok(Some(history))
    }
}
