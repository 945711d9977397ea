use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use pushqueue::audit::AuditStatusClient;
use pushqueue::db;
use pushqueue::endpoints::{Endpoint, EndpointRegistry};
use pushqueue::engine::{run_tick, EngineDeps};
use pushqueue::model::{
    AuditHistory, EndpointDetail, EndpointId, GroupId, Operation, PublishRequest, Status,
};
use pushqueue::transport::Publisher;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn endpoint(id: &str, group: &str) -> Endpoint {
    Endpoint {
        id: EndpointId::from(id),
        group: GroupId::from(group),
        base_url: format!("http://{id}.test"),
    }
}

fn success_snapshot(group: &str, endpoint_id: &str) -> AuditHistory {
    let mut history = AuditHistory::default();
    history.add_or_update_endpoint(
        GroupId::from(group),
        EndpointId::from(endpoint_id),
        EndpointDetail::new(Status::Success),
    );
    history
}

#[derive(Clone, Default)]
struct RecordingPublisher {
    requests: Arc<Mutex<Vec<PublishRequest>>>,
}

impl RecordingPublisher {
    async fn requests(&self) -> Vec<PublishRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<()> {
        self.requests.lock().await.push(request.clone());
        Ok(())
    }
}

/// Pops one scripted response per remote query; beyond the script every
/// endpoint reports "no record".
#[derive(Clone, Default)]
struct ScriptedAudit {
    responses: Arc<Mutex<VecDeque<Result<Option<AuditHistory>>>>>,
}

impl ScriptedAudit {
    fn with_responses(responses: Vec<Result<Option<AuditHistory>>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
        }
    }
}

#[async_trait::async_trait]
impl AuditStatusClient for ScriptedAudit {
    async fn remote_history(
        &self,
        _endpoint: &Endpoint,
        _bundle_id: &str,
    ) -> Result<Option<AuditHistory>> {
        self.responses.lock().await.pop_front().unwrap_or(Ok(None))
    }
}

fn deps<'a>(
    pool: &'a sqlx::SqlitePool,
    registry: &'a EndpointRegistry,
    publisher: &'a RecordingPublisher,
    audit: &'a ScriptedAudit,
    max_tries: i32,
) -> EngineDeps<'a> {
    EngineDeps {
        pool,
        registry,
        publisher,
        audit_client: audit,
        max_tries,
    }
}

#[tokio::test]
async fn single_asset_single_endpoint_succeeds_on_first_pass() {
    let pool = setup_pool().await;
    let registry = EndpointRegistry::from_endpoints(vec![endpoint("e1", "g1")]);
    let publisher = RecordingPublisher::default();

    db::enqueue_bundle(
        &pool,
        "b1",
        &["asset-1".into()],
        Operation::AddOrUpdate,
        Utc::now() - ChronoDuration::seconds(1),
    )
    .await
    .unwrap();

    // Tick 1 dispatches the bundle; its reconciliation pass already finds
    // the endpoint reporting success.
    let audit = ScriptedAudit::with_responses(vec![Ok(Some(success_snapshot("g1", "e1")))]);
    run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
        .await
        .unwrap();

    let requests = publisher.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].filters,
        vec![
            "+identifier:asset-1 +live:true".to_string(),
            "+identifier:asset-1 +working:true".to_string(),
        ]
    );

    let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(record.status, Status::Success);
    assert_eq!(record.history.num_tries, 0);
    assert_eq!(record.history.assets, vec!["asset-1"]);
    assert_eq!(db::queue_len(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn twenty_five_assets_yield_two_filter_pairs() {
    let pool = setup_pool().await;
    let registry = EndpointRegistry::from_endpoints(vec![endpoint("e1", "g1")]);
    let publisher = RecordingPublisher::default();
    let audit = ScriptedAudit::default();

    let assets: Vec<String> = (0..25).map(|i| format!("asset-{i:02}")).collect();
    db::enqueue_bundle(&pool, "b25", &assets, Operation::AddOrUpdate, Utc::now())
        .await
        .unwrap();

    run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
        .await
        .unwrap();

    let requests = publisher.requests().await;
    assert_eq!(requests.len(), 1);
    // Two batches (20 + 5), each a live/working pair.
    assert_eq!(requests[0].filters.len(), 4);
    assert_eq!(requests[0].filters[0].matches("identifier:").count(), 20);
    assert_eq!(requests[0].filters[2].matches("identifier:").count(), 5);
}

#[tokio::test]
async fn silent_endpoints_fail_after_max_tries() {
    let pool = setup_pool().await;
    let registry = EndpointRegistry::from_endpoints(vec![endpoint("e1", "g1")]);
    let publisher = RecordingPublisher::default();
    let max_tries = 5;

    db::enqueue_bundle(&pool, "b1", &["a1".into()], Operation::AddOrUpdate, Utc::now())
        .await
        .unwrap();

    let mut passes = 0;
    loop {
        let audit = ScriptedAudit::default();
        run_tick(&deps(&pool, &registry, &publisher, &audit, max_tries))
            .await
            .unwrap();
        passes += 1;

        let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
        if record.status.is_terminal() {
            assert_eq!(record.status, Status::FailedToPublish);
            assert_eq!(record.history.num_tries, max_tries);
            break;
        }
        assert_eq!(record.status, Status::PendingPublish);
        assert_eq!(record.history.num_tries, passes);
        assert!(passes <= max_tries, "bundle should have failed by now");
    }

    // Queue rows are gone; the audit history stays queryable for diagnosis.
    assert_eq!(db::queue_len(&pool).await.unwrap(), 0);
    let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(record.history.assets, vec!["a1"]);
    // The bundle was only ever handed to the transport once.
    assert_eq!(publisher.requests().await.len(), 1);
}

#[tokio::test]
async fn unreachable_then_confirming_endpoint() {
    let pool = setup_pool().await;
    let registry = EndpointRegistry::from_endpoints(vec![endpoint("e1", "g1")]);
    let publisher = RecordingPublisher::default();

    db::enqueue_bundle(&pool, "b1", &["a1".into()], Operation::AddOrUpdate, Utc::now())
        .await
        .unwrap();

    // Pass 1: endpoint unreachable; contributes nothing, bundle accrues one try.
    let audit = ScriptedAudit::with_responses(vec![Err(anyhow::anyhow!("connect timeout"))]);
    run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
        .await
        .unwrap();
    let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(record.status, Status::PendingPublish);
    assert_eq!(record.history.num_tries, 1);

    // Pass 2: endpoint reachable and confirming.
    let audit = ScriptedAudit::with_responses(vec![Ok(Some(success_snapshot("g1", "e1")))]);
    run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
        .await
        .unwrap();
    let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(record.status, Status::Success);
    // Only the fruitless first pass incremented the counter.
    assert_eq!(record.history.num_tries, 1);
    assert_eq!(db::queue_len(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn terminal_bundles_are_never_revived() {
    let pool = setup_pool().await;
    let registry = EndpointRegistry::from_endpoints(vec![endpoint("e1", "g1")]);
    let publisher = RecordingPublisher::default();

    db::enqueue_bundle(&pool, "b1", &["a1".into()], Operation::AddOrUpdate, Utc::now())
        .await
        .unwrap();

    let audit = ScriptedAudit::with_responses(vec![Ok(Some(success_snapshot("g1", "e1")))]);
    run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
        .await
        .unwrap();
    let terminal = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(terminal.status, Status::Success);

    // Further ticks: nothing to dispatch, nothing to reconcile, record
    // untouched.
    for _ in 0..3 {
        let audit = ScriptedAudit::default();
        run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
            .await
            .unwrap();
    }
    let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(record, terminal);
    assert_eq!(db::queue_len(&pool).await.unwrap(), 0);
    assert_eq!(publisher.requests().await.len(), 1);
}

#[tokio::test]
async fn two_groups_need_two_confirmations() {
    let pool = setup_pool().await;
    let registry = EndpointRegistry::from_endpoints(vec![
        endpoint("east-1", "east"),
        endpoint("west-1", "west"),
    ]);
    let publisher = RecordingPublisher::default();

    db::enqueue_bundle(&pool, "b1", &["a1".into()], Operation::AddOrUpdate, Utc::now())
        .await
        .unwrap();

    // Pass 1: east's snapshot shows east done but west still in flight;
    // west itself has no record yet. One reporting group out of two is
    // confirmed, so the bundle stays pending.
    let mut east_view = success_snapshot("east", "east-1");
    east_view.add_or_update_endpoint(
        GroupId::from("west"),
        EndpointId::from("west-1"),
        EndpointDetail::new(Status::SendingToEndpoints),
    );
    let audit = ScriptedAudit::with_responses(vec![Ok(Some(east_view)), Ok(None)]);
    run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
        .await
        .unwrap();
    let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(record.status, Status::PendingPublish);
    assert_eq!(record.history.num_tries, 1);

    // Pass 2: east is already terminal locally and is skipped; west confirms.
    let audit = ScriptedAudit::with_responses(vec![Ok(Some(success_snapshot("west", "west-1")))]);
    run_tick(&deps(&pool, &registry, &publisher, &audit, 5))
        .await
        .unwrap();
    let record = db::get_audit(&pool, "b1").await.unwrap().unwrap();
    assert_eq!(record.status, Status::Success);
    assert_eq!(db::queue_len(&pool).await.unwrap(), 0);
}
