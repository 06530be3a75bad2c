//! Boots every configured node and wires them into one network directory.

use std::{collections::BTreeMap, sync::Arc};

use log::info;

use vnode_transfer::{LocalEndpoint, NetworkDirectory, Route};

use crate::{
    error::NodeError,
    node::{Lifecycle, NodeRuntime},
    system::SystemConfig,
};

pub struct Fleet {
    nodes: BTreeMap<String, Arc<NodeRuntime>>,
    directory: Arc<NetworkDirectory>,
}

impl Fleet {
    /// Builds all nodes of `config` and starts them.
    pub fn boot(config: &SystemConfig) -> Result<Self, NodeError> {
        let endpoints = config
            .nodes
            .iter()
            .map(|node| LocalEndpoint::new(&node.storage_root))
            .collect::<Vec<_>>();

        let mut directory = NetworkDirectory::new();
        for (node, endpoint) in config.nodes.iter().zip(&endpoints) {
            directory.add_route(Route {
                id: node.id.clone(),
                address: node.address.clone(),
                capacity: node.capacity,
                endpoint: Arc::new(endpoint.clone()),
            });
        }
        let directory = Arc::new(directory);

        let mut nodes = BTreeMap::new();
        for (node, endpoint) in config.nodes.iter().zip(endpoints) {
            let runtime = NodeRuntime::new(node, &config.transfer, endpoint, directory.clone())?;
            runtime.start()?;
            nodes.insert(node.id.clone(), Arc::new(runtime));
        }
        info!("booted {} nodes", nodes.len());
        Ok(Self { nodes, directory })
    }

    /// Finds a node by id or address.
    pub fn node(&self, name: &str) -> Option<Arc<NodeRuntime>> {
        self.nodes
            .get(name)
            .or_else(|| self.nodes.values().find(|node| node.address() == name))
            .cloned()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<NodeRuntime>> {
        self.nodes.values()
    }

    pub fn directory(&self) -> &NetworkDirectory {
        &self.directory
    }

    /// Stops every node, persisting its disk.
    pub fn shutdown(&self) -> Vec<Lifecycle> {
        self.nodes.values().map(|node| node.stop()).collect()
    }
}
