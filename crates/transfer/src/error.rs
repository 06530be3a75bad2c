//! Errors raised while framing, moving and reassembling chunks.

use thiserror::Error;

/// Validation failure of an incoming or outgoing chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame of {received} bytes is shorter than the {header_size}-byte header")]
    MissingHeader { received: usize, header_size: usize },
    #[error("malformed chunk header: {0}")]
    MalformedHeader(String),
    #[error("chunk header {header:?} does not fit in {width} bytes")]
    HeaderOverflow { header: String, width: usize },
    #[error("chunk sequence numbers start at 1")]
    ZeroSequence,
    #[error("chunk header declares {declared} payload bytes but {actual} were received")]
    LengthMismatch { declared: u64, actual: u64 },
    #[error("chunk {sequence} of {filename} arrived without a transfer in progress")]
    NoSession { filename: String, sequence: u32 },
    #[error("chunk for {actual} arrived while receiving {expected}")]
    FilenameMismatch { expected: String, actual: String },
    #[error("chunk {actual} of {filename} arrived, expected chunk {expected}")]
    OutOfOrder { filename: String, expected: u32, actual: u32 },
    #[error("chunk count {0} must be between 1 and {max}", max = u32::MAX)]
    InvalidChunkCount(usize),
}

/// Failure of the underlying upload transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("endpoint {0} is not listening")]
    Unreachable(String),
    #[error("endpoint closed the connection")]
    Closed,
    #[error("endpoint {0} already has a listener")]
    AlreadyListening(String),
    #[error("invalid object name {0:?}")]
    InvalidName(String),
    #[error("write refused by receiver: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reason a whole transfer was refused or aborted on the sending side.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Target node {0} not found")]
    UnknownTarget(String),
    #[error("Not enough storage on {target}'s disk ({used} of {capacity} bytes used, {requested} requested)")]
    Capacity {
        target: String,
        used: u64,
        requested: u64,
        capacity: u64,
    },
    #[error("File {filename} already exists on {target}")]
    Duplicate { filename: String, target: String },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("transfer to {target} failed: {source}")]
    Transport {
        target: String,
        #[source]
        source: TransportError,
    },
}
