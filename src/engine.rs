//! Tick entry point: one dispatch pass followed by one reconciliation pass.

use crate::audit::AuditStatusClient;
use crate::db::Pool;
use crate::dispatch;
use crate::endpoints::EndpointRegistry;
use crate::reconcile;
use crate::transport::Publisher;
use anyhow::Result;
use chrono::Utc;
use tracing::instrument;

/// Everything one tick needs, passed explicitly so tests can swap the
/// remote-query and transport boundaries for doubles.
pub struct EngineDeps<'a> {
    pub pool: &'a Pool,
    pub registry: &'a EndpointRegistry,
    pub publisher: &'a dyn Publisher,
    pub audit_client: &'a dyn AuditStatusClient,
    pub max_tries: i32,
}

/// Run one tick. Dispatch first (newly-due bundles go out and get their
/// ledger entries), then reconciliation (previously-dispatched bundles
/// advance). Per-bundle failures are contained inside the cycles; an error
/// here means the tick itself could not run.
#[instrument(skip_all)]
pub async fn run_tick(deps: &EngineDeps<'_>) -> Result<()> {
    dispatch::run_dispatch(deps.pool, deps.registry, deps.publisher, Utc::now()).await?;
    reconcile::run_reconcile(deps.pool, deps.registry, deps.audit_client, deps.max_tries).await?;
    Ok(())
}
