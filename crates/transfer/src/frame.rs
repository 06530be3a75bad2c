//! Wire format of a single chunk.
//!
//! A frame is a fixed-width header followed by exactly `payload_length` raw bytes.
//! The header holds `"<sequence>:<payload_length>"` in ASCII, NUL padded to the
//! header width both ends agreed on.

use std::ops::Range;

use crate::error::ProtocolError;

const FIELD_SEPARATOR: char = ':';

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Position of the chunk in the transfer, starting at 1.
    pub sequence: u32,
    /// Number of payload bytes following the header.
    pub payload_length: u64,
}

impl FrameHeader {
    /// Encodes the header padded to exactly `header_size` bytes.
    pub fn encode(&self, header_size: usize) -> Result<Vec<u8>, ProtocolError> {
        let text = format!("{}{}{}", self.sequence, FIELD_SEPARATOR, self.payload_length);
        if text.len() > header_size {
            return Err(ProtocolError::HeaderOverflow {
                header: text,
                width: header_size,
            });
        }
        let mut bytes = text.into_bytes();
        bytes.resize(header_size, 0);
        Ok(bytes)
    }

    /// Decodes a header from its padded representation.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        if bytes[end..].iter().any(|&b| b != 0) {
            return Err(ProtocolError::MalformedHeader("data after padding".to_string()));
        }
        let text = std::str::from_utf8(&bytes[..end])
            .map_err(|_| ProtocolError::MalformedHeader("header is not ASCII".to_string()))?;
        let (sequence, payload_length) = text
            .split_once(FIELD_SEPARATOR)
            .ok_or_else(|| ProtocolError::MalformedHeader(format!("missing separator in {text:?}")))?;
        let sequence: u32 = sequence
            .parse()
            .map_err(|_| ProtocolError::MalformedHeader(format!("bad sequence number {sequence:?}")))?;
        let payload_length = payload_length
            .parse()
            .map_err(|_| ProtocolError::MalformedHeader(format!("bad payload length {payload_length:?}")))?;
        if sequence == 0 {
            return Err(ProtocolError::ZeroSequence);
        }
        Ok(Self {
            sequence,
            payload_length,
        })
    }
}

/// A chunk borrowed from a buffer, either about to be sent or just received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(sequence: u32, payload: &'a [u8]) -> Self {
        Frame {
            header: FrameHeader {
                sequence,
                payload_length: payload.len() as u64,
            },
            payload,
        }
    }

    /// Header followed by payload, ready to be written in one go.
    pub fn encode(&self, header_size: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = self.header.encode(header_size)?;
        bytes.extend_from_slice(self.payload);
        Ok(bytes)
    }

    /// Splits a received write into header and payload and checks the declared length.
    pub fn decode(bytes: &'a [u8], header_size: usize) -> Result<Self, ProtocolError> {
        if bytes.len() < header_size {
            return Err(ProtocolError::MissingHeader {
                received: bytes.len(),
                header_size,
            });
        }
        let (header, payload) = bytes.split_at(header_size);
        let header = FrameHeader::decode(header)?;
        if header.payload_length != payload.len() as u64 {
            return Err(ProtocolError::LengthMismatch {
                declared: header.payload_length,
                actual: payload.len() as u64,
            });
        }
        Ok(Frame { header, payload })
    }
}

/// Byte ranges of the chunks a payload of `total` bytes is split into.
///
/// Every chunk but the last holds `ceil(total / chunk_count)` bytes, so trailing
/// chunks may be short or empty. An empty payload still yields one empty chunk.
pub fn chunk_ranges(total: usize, chunk_count: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return vec![0..0];
    }
    let chunk_count = chunk_count.max(1);
    let chunk_size = total.div_ceil(chunk_count);
    (0..chunk_count)
        .map(|i| (i * chunk_size).min(total)..((i + 1) * chunk_size).min(total))
        .collect()
}
