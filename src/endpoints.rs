//! Receiver endpoint roster built from configuration.

use crate::config::Publishing;
use crate::model::{EndpointId, GroupId};

/// One configured receiving endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: EndpointId,
    pub group: GroupId,
    pub base_url: String,
}

/// Lookup over the configured receiver endpoints. An unknown id resolves to
/// `None`; callers treat that endpoint as still pending rather than failing.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    pub fn from_config(cfg: &Publishing) -> Self {
        let endpoints = cfg
            .endpoints
            .iter()
            .map(|e| Endpoint {
                id: EndpointId(e.id.clone()),
                group: GroupId(e.group.clone()),
                base_url: e.base_url.trim_end_matches('/').to_string(),
            })
            .collect();
        EndpointRegistry { endpoints }
    }

    pub fn from_endpoints(endpoints: Vec<Endpoint>) -> Self {
        EndpointRegistry { endpoints }
    }

    /// All configured receiver endpoints, in configuration order.
    pub fn receivers(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn find(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| &e.id == id)
    }
}
