//! Static map of the nodes reachable from a node.

use std::{collections::BTreeMap, sync::Arc};

use crate::transport::TransportEndpoint;

/// How to reach one node.
#[derive(Clone)]
pub struct Route {
    pub id: String,
    pub address: String,
    /// Fixed storage capacity of the node in bytes.
    pub capacity: u64,
    pub endpoint: Arc<dyn TransportEndpoint>,
}

#[derive(Clone, Default)]
pub struct NetworkDirectory {
    routes: BTreeMap<String, Route>,
}

impl NetworkDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route, replacing any previous route with the same id.
    pub fn add_route(&mut self, route: Route) {
        self.routes.insert(route.id.clone(), route);
    }

    /// Finds a node by id, falling back to its address.
    pub fn resolve(&self, target: &str) -> Option<&Route> {
        self.routes
            .get(target)
            .or_else(|| self.routes.values().find(|route| route.address == target))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
