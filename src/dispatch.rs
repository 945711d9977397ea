//! Dispatch cycle: finds due bundles in the queue, opens their audit
//! records and hands them to the transport.

use crate::db::{self, Pool};
use crate::endpoints::EndpointRegistry;
use crate::model::{
    AuditHistory, AuditStatus, BundleSummary, EndpointDetail, Operation, PublishRequest, Status,
};
use crate::queries;
use crate::transport::Publisher;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

/// Identity under which dispatched bundles execute downstream.
pub const SYSTEM_USER: &str = "system";

/// One dispatch pass. Scans the queue for bundles whose publish date has
/// arrived and sends each of them. A bundle that fails to dispatch is
/// logged, skipped and left in the queue for the next tick; it never stops
/// the other bundles.
#[instrument(skip_all)]
pub async fn run_dispatch(
    pool: &Pool,
    registry: &EndpointRegistry,
    publisher: &dyn Publisher,
    now: DateTime<Utc>,
) -> Result<()> {
    let summaries = db::bundle_summaries(pool).await?;
    debug!(bundles = summaries.len(), "dispatch scan");

    for summary in summaries {
        if summary.publish_date > now {
            continue;
        }
        if let Err(err) = dispatch_bundle(pool, registry, publisher, &summary).await {
            warn!(?err, bundle_id = %summary.bundle_id, "failed to dispatch bundle; will retry next tick");
        }
    }
    Ok(())
}

async fn dispatch_bundle(
    pool: &Pool,
    registry: &EndpointRegistry,
    publisher: &dyn Publisher,
    summary: &BundleSummary,
) -> Result<()> {
    let operation = Operation::from_code(summary.operation)
        .ok_or_else(|| anyhow!("unknown operation code {}", summary.operation))?;

    let entries = db::queue_entries_by_bundle(pool, &summary.bundle_id).await?;
    if entries.is_empty() {
        return Err(anyhow!("bundle has no queue entries"));
    }
    let assets: Vec<String> = entries.into_iter().map(|e| e.asset_id).collect();

    // Open the ledger entry before touching the transport. The endpoint map
    // is seeded with every configured receiver so the reconciliation cycle
    // knows whom to poll.
    let mut history = AuditHistory::with_assets(assets.clone());
    for endpoint in registry.receivers() {
        history.add_or_update_endpoint(
            endpoint.group.clone(),
            endpoint.id.clone(),
            EndpointDetail::new(Status::SendingToEndpoints),
        );
    }
    db::insert_audit(pool, &AuditStatus::pending(&summary.bundle_id, history)).await?;

    let request = PublishRequest {
        bundle_id: summary.bundle_id.clone(),
        filters: queries::asset_filters(&assets),
        mode: operation.into(),
        user: SYSTEM_USER.to_string(),
        endpoints: registry.receivers().to_vec(),
    };

    publisher.publish(&request).await?;
    info!(
        bundle_id = %summary.bundle_id,
        assets = assets.len(),
        mode = ?request.mode,
        "bundle dispatched"
    );
    Ok(())
}
