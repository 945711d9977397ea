//! Publishing transport boundary. The engine hands a fully-assembled
//! request over and never inspects the call's outcome; delivery results
//! come back later through the audit-status protocol.

use crate::model::PublishRequest;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

pub const PUBLISH_PATH: &str = "/api/bundlePublisher/publish";

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver the bundle described by `request` to its target endpoints.
    /// Fire-and-forget from the dispatch cycle's perspective.
    async fn publish(&self, request: &PublishRequest) -> Result<()>;
}

/// Default transport: POSTs the request to each target endpoint. A failure
/// against one endpoint is logged and does not abort the others; the
/// reconciliation cycle will find out what actually arrived.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    http: Client,
}

impl HttpPublisher {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("pushqueue/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .context("failed to build publish transport client")?;
        Ok(HttpPublisher { http })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<()> {
        for endpoint in &request.endpoints {
            let url = format!("{}{}", endpoint.base_url.trim_end_matches('/'), PUBLISH_PATH);
            let res = self.http.post(&url).json(request).send().await;
            match res {
                Ok(res) if res.status().is_success() => {
                    info!(bundle_id = %request.bundle_id, endpoint = %endpoint.id, "bundle handed to endpoint");
                }
                Ok(res) => {
                    warn!(
                        bundle_id = %request.bundle_id,
                        endpoint = %endpoint.id,
                        status = %res.status(),
                        "endpoint rejected bundle handoff"
                    );
                }
                Err(err) => {
                    warn!(
                        ?err,
                        bundle_id = %request.bundle_id,
                        endpoint = %endpoint.id,
                        "failed to hand bundle to endpoint"
                    );
                }
            }
        }
        Ok(())
    }
}
