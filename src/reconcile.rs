//! Reconciliation cycle: advances every pending audit record by polling the
//! remote nodes' own audit views, merging what they report and deciding
//! whether the bundle is done, failed or worth another try.

use crate::audit::AuditStatusClient;
use crate::db::{self, Pool};
use crate::endpoints::EndpointRegistry;
use crate::model::{AuditStatus, EndpointsMap, Status};
use crate::policy::{self, Decision};
use anyhow::Result;
use tracing::{debug, info, instrument, warn};

/// One reconciliation pass over all non-terminal audit records. A failure
/// while processing one bundle is logged and does not stop the rest.
#[instrument(skip_all)]
pub async fn run_reconcile(
    pool: &Pool,
    registry: &EndpointRegistry,
    client: &dyn AuditStatusClient,
    max_tries: i32,
) -> Result<()> {
    let pending = db::pending_audits(pool).await?;
    debug!(pending = pending.len(), "reconciliation scan");

    for audit in pending {
        let bundle_id = audit.bundle_id.clone();
        if let Err(err) = reconcile_bundle(pool, registry, client, audit, max_tries).await {
            warn!(?err, bundle_id = %bundle_id, "failed to reconcile bundle");
        }
    }
    Ok(())
}

async fn reconcile_bundle(
    pool: &Pool,
    registry: &EndpointRegistry,
    client: &dyn AuditStatusClient,
    mut audit: AuditStatus,
    max_tries: i32,
) -> Result<()> {
    let buffer = collect_remote_views(registry, client, &audit).await;

    // Fold the buffer into the local map and count fully-confirmed groups.
    // One success inside a group confirms the whole group.
    let buffer_len = buffer.len();
    let mut count_ok = 0;
    for (group, endpoints) in buffer {
        let mut group_ok = false;
        for (endpoint_id, detail) in endpoints {
            if detail.status == Status::Success.code() {
                group_ok = true;
            }
            audit
                .history
                .add_or_update_endpoint(group.clone(), endpoint_id, detail);
        }
        if group_ok {
            count_ok += 1;
        }
    }

    match policy::decide(count_ok, buffer_len, audit.history.num_tries, max_tries) {
        Decision::Success => {
            db::update_audit(pool, &audit.bundle_id, Status::Success, &audit.history).await?;
            db::delete_queue_entries(pool, &audit.bundle_id).await?;
            info!(bundle_id = %audit.bundle_id, "bundle published on every group");
        }
        Decision::FailedToPublish => {
            db::update_audit(pool, &audit.bundle_id, Status::FailedToPublish, &audit.history)
                .await?;
            db::delete_queue_entries(pool, &audit.bundle_id).await?;
            warn!(
                bundle_id = %audit.bundle_id,
                tries = audit.history.num_tries,
                "retry ceiling reached; bundle marked failed"
            );
        }
        Decision::Retry { num_tries } => {
            audit.history.num_tries = num_tries;
            db::update_audit(pool, &audit.bundle_id, audit.status, &audit.history).await?;
            debug!(bundle_id = %audit.bundle_id, tries = num_tries, "bundle still pending");
        }
    }
    Ok(())
}

/// Query the remote audit views for one bundle. Endpoints whose recorded
/// status is already terminal are skipped. Within a group the scan stops at
/// the first endpoint that returns any snapshot: groups are redundant
/// targets, so one answer is taken as evidence for the whole group, whether
/// or not that answer reports success. All groups of each snapshot are
/// buffered, last response winning per group.
async fn collect_remote_views(
    registry: &EndpointRegistry,
    client: &dyn AuditStatusClient,
    audit: &AuditStatus,
) -> EndpointsMap {
    let mut buffer = EndpointsMap::new();

    for (group, endpoints) in &audit.history.endpoints_map {
        for (endpoint_id, detail) in endpoints {
            if Status::is_terminal_code(detail.status) {
                continue;
            }
            let Some(endpoint) = registry.find(endpoint_id) else {
                debug!(endpoint = %endpoint_id, group = %group, "endpoint not configured; skipping");
                continue;
            };
            match client.remote_history(endpoint, &audit.bundle_id).await {
                Ok(Some(remote)) => {
                    for (g, eps) in remote.endpoints_map {
                        buffer.insert(g, eps);
                    }
                    break;
                }
                Ok(None) => {
                    debug!(
                        endpoint = %endpoint_id,
                        bundle_id = %audit.bundle_id,
                        "endpoint has no audit record yet"
                    );
                }
                Err(err) => {
                    warn!(
                        ?err,
                        endpoint = %endpoint_id,
                        bundle_id = %audit.bundle_id,
                        "audit status query failed; endpoint stays pending"
                    );
                }
            }
        }
    }

    buffer
}
