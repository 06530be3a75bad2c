//! Errors returned by node operations.

use thiserror::Error;

use vnode_transfer::{ProtocolError, TransferError, TransportError};

/// Failure to read or write the persisted disk metadata. Never fatal to a node.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("can't access metadata {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse metadata {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported metadata version {0}")]
    UnsupportedVersion(u32),
    #[error("file sizes in metadata {path} add up to more than {max} bytes", max = u64::MAX)]
    SizeOverflow { path: String },
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("VM {0} is not running")]
    NotRunning(String),
    #[error("File {0} does not exist")]
    FileNotFound(String),
    #[error("Variable {0} not found in memory")]
    VariableNotFound(String),
    #[error("Not enough storage on disk ({used} of {capacity} bytes used, {requested} requested)")]
    Capacity { used: u64, requested: u64, capacity: u64 },
    #[error("Not enough storage on {target}'s disk ({used} of {capacity} bytes used, {requested} requested)")]
    TargetCapacity {
        target: String,
        used: u64,
        requested: u64,
        capacity: u64,
    },
    #[error("File {filename} already exists on {target}")]
    Duplicate { filename: String, target: String },
    #[error("Cannot send file to self")]
    SelfTarget,
    #[error("Target node {0} not found")]
    UnknownTarget(String),
    #[error("{0}")]
    Type(String),
    #[error("Unknown instruction {0}")]
    UnknownInstruction(String),
    #[error("{0}")]
    InvalidArguments(String),
    #[error("Invalid command {0:?}. Use: ls, touch <filename> [size], trunc <filename> [size], send <filename> <target>, set <var> <value>, get <var>, add <var1> <var2>, start, stop")]
    UnknownCommand(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("transport of {node} failed: {source}")]
    Transport {
        node: String,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<TransferError> for NodeError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::UnknownTarget(target) => NodeError::UnknownTarget(target),
            TransferError::Capacity {
                target,
                used,
                requested,
                capacity,
            } => NodeError::TargetCapacity {
                target,
                used,
                requested,
                capacity,
            },
            TransferError::Duplicate { filename, target } => NodeError::Duplicate { filename, target },
            TransferError::Protocol(err) => NodeError::Protocol(err),
            TransferError::Transport { target, source } => NodeError::Transport { node: target, source },
        }
    }
}

/// Failure to load a configuration or script file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse YAML from file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
