use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_COUNT: usize = 5;
pub const DEFAULT_HEADER_SIZE: usize = 16;
/// 1 MiB per second.
pub const DEFAULT_BANDWIDTH: u64 = 1024 * 1024;

/// Parameters both ends of a transfer must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Number of chunks every non-empty file is split into.
    pub chunk_count: usize,
    /// Width of the chunk header in bytes.
    pub header_size: usize,
    /// Sustained sending bandwidth in bytes per second.
    pub bandwidth: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_count: DEFAULT_CHUNK_COUNT,
            header_size: DEFAULT_HEADER_SIZE,
            bandwidth: DEFAULT_BANDWIDTH,
        }
    }
}
