use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use vnode_transfer::TransferConfig;

/// 100 MiB.
pub const DEFAULT_CAPACITY: u64 = 100 * 1024 * 1024;

fn default_capacity() -> u64 {
    DEFAULT_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub address: String,
    /// Host directory holding the node's files and metadata.
    pub storage_root: PathBuf,
    /// Disk capacity in bytes.
    #[serde(default = "default_capacity")]
    pub capacity: u64,
}

impl NodeConfig {
    /// `nodeN` at `192.168.1.N` stored under `./assets/nodeN`.
    pub fn numbered(n: usize) -> Self {
        Self {
            id: format!("node{n}"),
            address: format!("192.168.1.{n}"),
            storage_root: PathBuf::from(format!("./assets/node{n}")),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default = "default_nodes")]
    pub nodes: Vec<NodeConfig>,
}

fn default_nodes() -> Vec<NodeConfig> {
    (1..=3).map(NodeConfig::numbered).collect()
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            nodes: default_nodes(),
        }
    }
}
