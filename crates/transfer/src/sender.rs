//! Sending side of a transfer.

use std::{fmt, time::Instant};

use log::{debug, info};
use serde::Serialize;

use crate::{
    config::TransferConfig,
    directory::NetworkDirectory,
    error::{TransferError, TransportError},
    frame::{chunk_ranges, Frame},
    pacing::Pacer,
    transport::{ObjectInfo, WriteMode, METADATA_MARKER},
};

/// Summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub filename: String,
    /// Id of the node the file was sent to.
    pub target: String,
    pub bytes: u64,
    pub chunks: usize,
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sent {} ({} bytes) to {} in {} chunks",
            self.filename, self.bytes, self.target, self.chunks
        )
    }
}

/// Bytes a node reports as stored, ignoring its metadata marker.
pub fn used_capacity(listing: &[ObjectInfo]) -> u64 {
    listing
        .iter()
        .filter(|object| object.name != METADATA_MARKER)
        .map(|object| object.size)
        .sum()
}

/// Splits files into frames and streams them to other nodes, blocking until done.
pub struct TransferSender {
    config: TransferConfig,
    pacer: Pacer,
}

impl TransferSender {
    pub fn new(config: TransferConfig) -> Self {
        let pacer = Pacer::new(config.bandwidth);
        Self { config, pacer }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Sends `data` as `filename` to the node `target` resolves to.
    ///
    /// The target's free space and the absence of `filename` are checked from a
    /// listing of its storage root before anything is written. Any failure aborts
    /// the transfer; chunks already written stay where they are.
    pub fn send(
        &self,
        directory: &NetworkDirectory,
        target: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<TransferReport, TransferError> {
        let route = directory
            .resolve(target)
            .ok_or_else(|| TransferError::UnknownTarget(target.to_string()))?;
        let transport_failure = |source: TransportError| TransferError::Transport {
            target: route.id.clone(),
            source,
        };

        let listing = route.endpoint.list().map_err(transport_failure)?;
        let used = used_capacity(&listing);
        let requested = data.len() as u64;
        if used.saturating_add(requested) > route.capacity {
            return Err(TransferError::Capacity {
                target: route.id.clone(),
                used,
                requested,
                capacity: route.capacity,
            });
        }
        if listing.iter().any(|object| object.name == filename) {
            return Err(TransferError::Duplicate {
                filename: filename.to_string(),
                target: route.id.clone(),
            });
        }

        let ranges = chunk_ranges(data.len(), self.config.chunk_count);
        let frames = ranges
            .iter()
            .enumerate()
            .map(|(i, range)| Frame::new(i as u32 + 1, &data[range.clone()]).encode(self.config.header_size))
            .collect::<Result<Vec<_>, _>>()?;

        let chunks = frames.len();
        for ((i, frame), range) in frames.into_iter().enumerate().zip(ranges) {
            let sequence = i + 1;
            let mode = if sequence == 1 {
                WriteMode::Create
            } else {
                WriteMode::Append
            };
            let started = Instant::now();
            route.endpoint.write(filename, mode, frame).map_err(transport_failure)?;
            let slept = self.pacer.pace(started, range.len());
            debug!(
                "sent chunk {}/{} of {} ({} bytes) to {}, paced for {:.2?}",
                sequence,
                chunks,
                filename,
                range.len(),
                route.id,
                slept
            );
        }

        info!("sent {} ({} bytes, {} chunks) to {}", filename, requested, chunks, route.id);
        Ok(TransferReport {
            filename: filename.to_string(),
            target: route.id.clone(),
            bytes: requested,
            chunks,
        })
    }
}
