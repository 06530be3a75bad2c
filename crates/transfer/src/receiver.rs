//! Receiving side of a transfer: reassembly of incoming frames.
//!
//! A receiver tracks at most one [`TransferSession`]. Sequence 1 always starts a
//! new session, dropping whatever was in progress. Later frames must name the same
//! file and carry the next expected sequence number, otherwise the session is
//! abandoned and the sender has to start over. Frames that fail to decode are
//! dropped without touching the session.

use std::{
    fmt::Display,
    sync::{Mutex, PoisonError},
};

use log::{debug, error, info, warn};

use crate::{
    config::TransferConfig,
    error::{ProtocolError, TransportError},
    frame::Frame,
    transport::{Upload, UploadHandler},
};

/// Destination of completely reassembled files.
pub trait TransferSink: Send + Sync {
    type Error: Display;

    /// Stores `data` as `filename`, returning the stored size.
    fn finalize(&self, filename: &str, data: Vec<u8>) -> Result<u64, Self::Error>;
}

/// In-progress reassembly of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    pub filename: String,
    pub expected_chunk_count: u32,
    pub next_expected_sequence: u32,
    pub accumulated_payload: Vec<u8>,
}

impl TransferSession {
    /// Session opened by a sequence-1 frame. An empty first chunk can only come from
    /// an empty file, which is sent as that single chunk.
    fn start(filename: &str, payload: &[u8], chunk_count: u32) -> Self {
        Self {
            filename: filename.to_string(),
            expected_chunk_count: if payload.is_empty() { 1 } else { chunk_count },
            next_expected_sequence: 2,
            accumulated_payload: payload.to_vec(),
        }
    }

    fn is_complete(&self) -> bool {
        self.next_expected_sequence - 1 >= self.expected_chunk_count
    }
}

/// What happened to one incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The frame was invalid and ignored.
    Discarded(ProtocolError),
    /// A new session was opened.
    Started { filename: String, expected_chunks: u32 },
    /// The frame was appended to the current session.
    Accepted { filename: String, sequence: u32 },
    /// The frame broke the session, which was dropped.
    Aborted { filename: String, error: ProtocolError },
    /// The last frame arrived and the file was stored.
    Finalized { filename: String, size: u64 },
    /// The file was reassembled but the sink refused it.
    Rejected { filename: String, reason: String },
}

pub struct TransferReceiver<S> {
    chunk_count: u32,
    header_size: usize,
    session: Mutex<Option<TransferSession>>,
    sink: S,
}

impl<S: TransferSink> TransferReceiver<S> {
    /// Fails if the configured chunk count is zero or does not fit a sequence number.
    pub fn new(config: &TransferConfig, sink: S) -> Result<Self, ProtocolError> {
        let chunk_count = u32::try_from(config.chunk_count)
            .ok()
            .filter(|&count| count > 0)
            .ok_or(ProtocolError::InvalidChunkCount(config.chunk_count))?;
        Ok(Self {
            chunk_count,
            header_size: config.header_size,
            session: Mutex::new(None),
            sink,
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Copy of the session in progress, if any.
    pub fn session(&self) -> Option<TransferSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Folds one raw write of `filename` into the session state.
    pub fn receive(&self, filename: &str, bytes: &[u8]) -> ReceiveOutcome {
        let frame = match Frame::decode(bytes, self.header_size) {
            Ok(frame) => frame,
            Err(err) => return ReceiveOutcome::Discarded(err),
        };
        let sequence = frame.header.sequence;

        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = if sequence == 1 {
            if let Some(previous) = slot.take() {
                warn!(
                    "dropping unfinished transfer of {} after {} chunks",
                    previous.filename,
                    previous.next_expected_sequence - 1
                );
            }
            let session = TransferSession::start(filename, frame.payload, self.chunk_count);
            let outcome = ReceiveOutcome::Started {
                filename: filename.to_string(),
                expected_chunks: session.expected_chunk_count,
            };
            *slot = Some(session);
            outcome
        } else {
            let Some(session) = slot.as_mut() else {
                return ReceiveOutcome::Discarded(ProtocolError::NoSession {
                    filename: filename.to_string(),
                    sequence,
                });
            };
            if session.filename != filename {
                let error = ProtocolError::FilenameMismatch {
                    expected: session.filename.clone(),
                    actual: filename.to_string(),
                };
                return abort(slot.take(), error);
            }
            if sequence != session.next_expected_sequence {
                let error = ProtocolError::OutOfOrder {
                    filename: filename.to_string(),
                    expected: session.next_expected_sequence,
                    actual: sequence,
                };
                return abort(slot.take(), error);
            }
            session.accumulated_payload.extend_from_slice(frame.payload);
            session.next_expected_sequence += 1;
            ReceiveOutcome::Accepted {
                filename: filename.to_string(),
                sequence,
            }
        };

        if !slot.as_ref().is_some_and(TransferSession::is_complete) {
            return outcome;
        }
        let Some(session) = slot.take() else {
            return outcome;
        };
        drop(slot);

        match self.sink.finalize(&session.filename, session.accumulated_payload) {
            Ok(size) => ReceiveOutcome::Finalized {
                filename: session.filename,
                size,
            },
            Err(err) => ReceiveOutcome::Rejected {
                filename: session.filename,
                reason: err.to_string(),
            },
        }
    }
}

fn abort(session: Option<TransferSession>, error: ProtocolError) -> ReceiveOutcome {
    ReceiveOutcome::Aborted {
        filename: session.map(|session| session.filename).unwrap_or_default(),
        error,
    }
}

/// Frames that were discarded, broke the session or could not be stored fail the write.
impl<S: TransferSink> UploadHandler for TransferReceiver<S> {
    fn on_upload(&self, upload: &Upload) -> Result<(), TransportError> {
        match self.receive(&upload.name, &upload.data) {
            ReceiveOutcome::Discarded(err) => {
                warn!("discarded chunk of {}: {}", upload.name, err);
                Err(TransportError::Rejected(err.to_string()))
            }
            ReceiveOutcome::Started {
                filename,
                expected_chunks,
            } => {
                debug!("receiving {} in {} chunks", filename, expected_chunks);
                Ok(())
            }
            ReceiveOutcome::Accepted { filename, sequence } => {
                debug!("received chunk {} of {}", sequence, filename);
                Ok(())
            }
            ReceiveOutcome::Aborted { filename, error } => {
                error!("aborted transfer of {}: {}", filename, error);
                Err(TransportError::Rejected(error.to_string()))
            }
            ReceiveOutcome::Finalized { filename, size } => {
                info!("received {} ({} bytes)", filename, size);
                Ok(())
            }
            ReceiveOutcome::Rejected { filename, reason } => {
                error!("refused received {}: {}", filename, reason);
                Err(TransportError::Rejected(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    use super::*;
    use crate::{frame::chunk_ranges, transport::WriteMode};

    #[derive(Default)]
    struct Collector(Mutex<Vec<(String, Vec<u8>)>>);

    impl TransferSink for Collector {
        type Error = String;

        fn finalize(&self, filename: &str, data: Vec<u8>) -> Result<u64, String> {
            if filename == "refused" {
                return Err("no space".to_string());
            }
            let size = data.len() as u64;
            self.0.lock().unwrap().push((filename.to_string(), data));
            Ok(size)
        }
    }

    fn receiver() -> TransferReceiver<Collector> {
        TransferReceiver::new(&TransferConfig::default(), Collector::default()).unwrap()
    }

    fn upload(name: &str, data: &[u8]) -> Upload {
        Upload {
            name: name.to_string(),
            mode: WriteMode::Create,
            data: data.to_vec(),
        }
    }

    fn frames(data: &[u8]) -> Vec<Vec<u8>> {
        chunk_ranges(data.len(), 5)
            .into_iter()
            .enumerate()
            .map(|(i, range)| Frame::new(i as u32 + 1, &data[range]).encode(16).unwrap())
            .collect()
    }

    fn stored(receiver: &TransferReceiver<Collector>) -> Vec<(String, Vec<u8>)> {
        receiver.sink().0.lock().unwrap().clone()
    }

    #[test]
    fn in_order_frames_finalize() {
        let data = (0..23).collect::<Vec<u8>>();
        let receiver = receiver();
        let frames = frames(&data);
        assert_eq!(
            receiver.receive("a.bin", &frames[0]),
            ReceiveOutcome::Started {
                filename: "a.bin".to_string(),
                expected_chunks: 5
            }
        );
        for (i, frame) in frames.iter().enumerate().take(4).skip(1) {
            assert_eq!(
                receiver.receive("a.bin", frame),
                ReceiveOutcome::Accepted {
                    filename: "a.bin".to_string(),
                    sequence: i as u32 + 1
                }
            );
        }
        assert_eq!(receiver.session().unwrap().accumulated_payload, data[..20].to_vec());
        assert_eq!(
            receiver.receive("a.bin", &frames[4]),
            ReceiveOutcome::Finalized {
                filename: "a.bin".to_string(),
                size: 23
            }
        );
        assert!(receiver.session().is_none());
        assert_eq!(stored(&receiver), vec![("a.bin".to_string(), data)]);
    }

    #[test]
    fn empty_file_finalizes_on_first_frame() {
        let receiver = receiver();
        let frames = frames(&[]);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            receiver.receive("empty", &frames[0]),
            ReceiveOutcome::Finalized {
                filename: "empty".to_string(),
                size: 0
            }
        );
        assert_eq!(stored(&receiver), vec![("empty".to_string(), Vec::new())]);
    }

    #[test]
    fn reassembly_matches_source() {
        let mut rng = Pcg64::seed_from_u64(123);
        let receiver = receiver();
        for _ in 0..200 {
            let len = rng.gen_range(0..300);
            let data = (0..len).map(|_| rng.gen()).collect::<Vec<u8>>();
            for frame in frames(&data) {
                receiver.receive("f", &frame);
            }
            let (name, stored) = receiver.sink().0.lock().unwrap().pop().unwrap();
            assert_eq!(name, "f");
            assert_eq!(stored, data);
        }
    }

    #[test]
    fn out_of_order_frame_aborts_session() {
        let data = (0..23).collect::<Vec<u8>>();
        for k in 2..5 {
            let receiver = receiver();
            let frames = frames(&data);
            for frame in &frames[..k - 1] {
                receiver.receive("a.bin", frame);
            }
            assert_eq!(
                receiver.receive("a.bin", &frames[k]),
                ReceiveOutcome::Aborted {
                    filename: "a.bin".to_string(),
                    error: ProtocolError::OutOfOrder {
                        filename: "a.bin".to_string(),
                        expected: k as u32,
                        actual: k as u32 + 1
                    }
                }
            );
            assert!(receiver.session().is_none());
            assert!(matches!(
                receiver.receive("a.bin", &frames[k - 1]),
                ReceiveOutcome::Discarded(ProtocolError::NoSession { .. })
            ));
            assert!(stored(&receiver).is_empty());
        }
    }

    #[test]
    fn filename_mismatch_aborts_session() {
        let data = (0..23).collect::<Vec<u8>>();
        let receiver = receiver();
        let frames = frames(&data);
        receiver.receive("a.bin", &frames[0]);
        assert!(matches!(
            receiver.receive("b.bin", &frames[1]),
            ReceiveOutcome::Aborted {
                error: ProtocolError::FilenameMismatch { .. },
                ..
            }
        ));
        assert!(receiver.session().is_none());
    }

    #[test]
    fn corrupt_frame_keeps_session() {
        let data = (0..23).collect::<Vec<u8>>();
        let receiver = receiver();
        let frames = frames(&data);
        receiver.receive("a.bin", &frames[0]);

        let mut corrupt = frames[1].clone();
        corrupt.pop();
        assert!(matches!(
            receiver.receive("a.bin", &corrupt),
            ReceiveOutcome::Discarded(ProtocolError::LengthMismatch { .. })
        ));
        assert!(matches!(
            receiver.receive("a.bin", b"junk"),
            ReceiveOutcome::Discarded(ProtocolError::MissingHeader { .. })
        ));
        assert_eq!(receiver.session().unwrap().next_expected_sequence, 2);

        for frame in &frames[1..] {
            receiver.receive("a.bin", frame);
        }
        assert_eq!(stored(&receiver), vec![("a.bin".to_string(), data)]);
    }

    #[test]
    fn first_frame_preempts_session() {
        let receiver = receiver();
        let first = frames(&(0..23).collect::<Vec<u8>>());
        let second = frames(b"0123456789");
        receiver.receive("a.bin", &first[0]);
        receiver.receive("a.bin", &first[1]);
        for frame in &second {
            receiver.receive("b.bin", frame);
        }
        assert_eq!(stored(&receiver), vec![("b.bin".to_string(), b"0123456789".to_vec())]);
        assert!(matches!(
            receiver.receive("a.bin", &first[2]),
            ReceiveOutcome::Discarded(ProtocolError::NoSession { .. })
        ));
    }

    #[test]
    fn sink_refusal_clears_session() {
        let receiver = receiver();
        let mut outcome = None;
        for frame in frames(b"abcdefghij") {
            outcome = Some(receiver.receive("refused", &frame));
        }
        assert_eq!(
            outcome,
            Some(ReceiveOutcome::Rejected {
                filename: "refused".to_string(),
                reason: "no space".to_string()
            })
        );
        assert!(receiver.session().is_none());
    }

    #[test]
    fn unusable_writes_are_refused() {
        let receiver = receiver();
        let frames = frames(b"abcdefghij");

        assert!(matches!(receiver.on_upload(&upload("a.bin", b"junk")), Err(TransportError::Rejected(_))));
        receiver.on_upload(&upload("a.bin", &frames[0])).unwrap();
        receiver.on_upload(&upload("a.bin", &frames[1])).unwrap();
        assert!(matches!(receiver.on_upload(&upload("a.bin", &frames[3])), Err(TransportError::Rejected(_))));

        for frame in &frames[..4] {
            receiver.on_upload(&upload("refused", frame)).unwrap();
        }
        assert!(matches!(
            receiver.on_upload(&upload("refused", &frames[4])),
            Err(TransportError::Rejected(reason)) if reason == "no space"
        ));

        for frame in &frames {
            receiver.on_upload(&upload("b.bin", frame)).unwrap();
        }
        assert_eq!(stored(&receiver), vec![("b.bin".to_string(), b"abcdefghij".to_vec())]);
    }

    #[test]
    fn chunk_count_must_fit_a_sequence_number() {
        let zero = TransferConfig {
            chunk_count: 0,
            ..TransferConfig::default()
        };
        assert_eq!(
            TransferReceiver::new(&zero, Collector::default()).err(),
            Some(ProtocolError::InvalidChunkCount(0))
        );

        let largest = TransferConfig {
            chunk_count: u32::MAX as usize,
            ..TransferConfig::default()
        };
        assert_eq!(TransferReceiver::new(&largest, Collector::default()).unwrap().chunk_count, u32::MAX);

        if let Some(count) = (u32::MAX as usize).checked_add(1) {
            let overflowing = TransferConfig {
                chunk_count: count,
                ..TransferConfig::default()
            };
            assert_eq!(
                TransferReceiver::new(&overflowing, Collector::default()).err(),
                Some(ProtocolError::InvalidChunkCount(count))
            );
        }
    }
}
