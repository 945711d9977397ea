use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status codes shared by the bundle level and the endpoint level.
/// `Success` and `FailedToPublish` are terminal; everything else is
/// subject to further reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Bundling,
    Publishing,
    SendingToEndpoints,
    PendingPublish,
    Success,
    FailedToBundle,
    FailedToPublish,
}

impl Status {
    pub fn code(&self) -> i32 {
        match self {
            Status::Bundling => 1,
            Status::Publishing => 2,
            Status::SendingToEndpoints => 3,
            Status::PendingPublish => 4,
            Status::Success => 5,
            Status::FailedToBundle => 6,
            Status::FailedToPublish => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Status> {
        match code {
            1 => Some(Status::Bundling),
            2 => Some(Status::Publishing),
            3 => Some(Status::SendingToEndpoints),
            4 => Some(Status::PendingPublish),
            5 => Some(Status::Success),
            6 => Some(Status::FailedToBundle),
            7 => Some(Status::FailedToPublish),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::FailedToPublish)
    }

    pub fn is_terminal_code(code: i32) -> bool {
        code == Status::Success.code() || code == Status::FailedToPublish.code()
    }
}

/// Queue operation codes as stored in the queue table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    AddOrUpdate,
    Delete,
}

impl Operation {
    pub fn code(&self) -> i64 {
        match self {
            Operation::AddOrUpdate => 1,
            Operation::Delete => 2,
        }
    }

    /// Fallible: an unknown code in a queue row is a local data error and
    /// must skip only that bundle.
    pub fn from_code(code: i64) -> Option<Operation> {
        match code {
            1 => Some(Operation::AddOrUpdate),
            2 => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// What the transport is asked to do with a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublishMode {
    Publish,
    Unpublish,
}

impl From<Operation> for PublishMode {
    fn from(op: Operation) -> Self {
        match op {
            Operation::AddOrUpdate => PublishMode::Publish,
            Operation::Delete => PublishMode::Unpublish,
        }
    }
}

/// Identifier of an endpoint group. Groups are redundant delivery targets:
/// one confirmed endpoint is enough for the whole group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

/// Identifier of a single receiving endpoint. Kept distinct from `GroupId`
/// so the two key levels of the endpoints map cannot be mixed up.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        GroupId(s.to_string())
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        EndpointId(s.to_string())
    }
}

/// Per-endpoint delivery state, owned by exactly one audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDetail {
    pub status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl EndpointDetail {
    pub fn new(status: Status) -> Self {
        EndpointDetail {
            status: status.code(),
            info: None,
        }
    }

    pub fn with_info(status: Status, info: impl Into<String>) -> Self {
        EndpointDetail {
            status: status.code(),
            info: Some(info.into()),
        }
    }
}

pub type EndpointsMap = BTreeMap<GroupId, BTreeMap<EndpointId, EndpointDetail>>;

/// The mutable body of an audit record: asset snapshot, try counter and the
/// two-level group -> endpoint delivery map. Serialized as JSON both into
/// the audit table and over the audit-status wire protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditHistory {
    pub assets: Vec<String>,
    pub num_tries: i32,
    pub endpoints_map: EndpointsMap,
}

impl AuditHistory {
    pub fn with_assets(assets: Vec<String>) -> Self {
        AuditHistory {
            assets,
            num_tries: 0,
            endpoints_map: BTreeMap::new(),
        }
    }

    /// Stable upsert of one endpoint detail. Re-applying the same detail
    /// leaves the map unchanged.
    pub fn add_or_update_endpoint(
        &mut self,
        group: GroupId,
        endpoint: EndpointId,
        detail: EndpointDetail,
    ) {
        self.endpoints_map
            .entry(group)
            .or_default()
            .insert(endpoint, detail);
    }
}

/// One row of the audit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStatus {
    pub bundle_id: String,
    pub status: Status,
    pub history: AuditHistory,
}

impl AuditStatus {
    pub fn pending(bundle_id: impl Into<String>, history: AuditHistory) -> Self {
        AuditStatus {
            bundle_id: bundle_id.into(),
            status: Status::PendingPublish,
            history,
        }
    }
}

/// One queue row: one asset of one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub bundle_id: String,
    pub asset_id: String,
    pub operation: i64,
    pub publish_date: DateTime<Utc>,
}

/// Aggregated queue view: one row per bundle id.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleSummary {
    pub bundle_id: String,
    pub operation: i64,
    pub publish_date: DateTime<Utc>,
}

/// Immutable per-bundle publish request handed to the transport. Built
/// fresh for every bundle so no state leaks between dispatches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRequest {
    pub bundle_id: String,
    pub filters: Vec<String>,
    pub mode: PublishMode,
    pub user: String,
    #[serde(skip)]
    pub endpoints: Vec<crate::endpoints::Endpoint>,
}
