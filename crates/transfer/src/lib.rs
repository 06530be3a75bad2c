//! Chunked, rate-limited file transfer between simulated nodes.
//!
//! Files are split into a fixed number of framed chunks ([`frame`]), paced against a
//! bandwidth limit ([`pacing`]) and uploaded through a [`transport::TransportEndpoint`].
//! On the other side a [`receiver::TransferReceiver`] reassembles them and hands the
//! complete file to a [`receiver::TransferSink`].

pub mod config;
pub mod directory;
pub mod error;
pub mod frame;
pub mod pacing;
pub mod receiver;
pub mod sender;
pub mod transport;

pub use config::TransferConfig;
pub use directory::{NetworkDirectory, Route};
pub use error::{ProtocolError, TransferError, TransportError};
pub use receiver::{ReceiveOutcome, TransferReceiver, TransferSession, TransferSink};
pub use sender::{TransferReport, TransferSender};
pub use transport::{LocalEndpoint, TransportEndpoint, METADATA_MARKER, STAGING_DIR};
