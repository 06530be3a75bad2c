//! Reliable upload transport between nodes.
//!
//! [`TransportEndpoint`] is the client view of a node's storage root: list the
//! objects it holds and upload bytes to it. [`LocalEndpoint`] serves a directory
//! on the local file system. Uploads are handed to a listener thread which stages
//! the raw bytes, passes them to an [`UploadHandler`] and removes the staged copy.
//! A write returns only after the listener has processed it, and fails if the
//! handler refused it.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use log::{debug, error, warn};

use crate::error::TransportError;

/// Per-node metadata object kept in the storage root. Never counts as stored data.
pub const METADATA_MARKER: &str = "disk_metadata.json";
/// Directory inside the storage root where incoming writes are staged.
pub const STAGING_DIR: &str = ".staging";

/// One entry of a storage root listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the object, replacing any previous content.
    Create,
    /// Append to the object, creating it if needed.
    Append,
}

/// A single write received by an endpoint.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub mode: WriteMode,
    pub data: Vec<u8>,
}

/// Callback invoked by a listener for every received write.
pub trait UploadHandler: Send + Sync {
    /// An error is returned to the writer as the result of its write.
    fn on_upload(&self, upload: &Upload) -> Result<(), TransportError>;
}

/// Client side of a node's transport.
pub trait TransportEndpoint: Send + Sync {
    /// Lists regular objects in the storage root.
    fn list(&self) -> Result<Vec<ObjectInfo>, TransportError>;

    /// Uploads `data` as object `name`.
    fn write(&self, name: &str, mode: WriteMode, data: Vec<u8>) -> Result<(), TransportError>;
}

struct Request {
    upload: Upload,
    reply: mpsc::Sender<Result<(), TransportError>>,
}

struct Shared {
    root: PathBuf,
    inbox: Mutex<Option<mpsc::Sender<Request>>>,
}

impl Shared {
    fn inbox(&self) -> Option<mpsc::Sender<Request>> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn unreachable(&self) -> TransportError {
        TransportError::Unreachable(self.root.display().to_string())
    }
}

/// Endpoint serving a directory. Clones share the same listener slot, so handing a
/// clone to other nodes lets them reach this node while it listens.
#[derive(Clone)]
pub struct LocalEndpoint {
    shared: Arc<Shared>,
}

impl LocalEndpoint {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                root: root.into(),
                inbox: Mutex::new(None),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn is_listening(&self) -> bool {
        self.shared.inbox().is_some()
    }

    /// Starts accepting writes, delivering each of them to `handler`.
    pub fn listen(&self, handler: Arc<dyn UploadHandler>) -> Result<Listener, TransportError> {
        let mut inbox = self.shared.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        if inbox.is_some() {
            return Err(TransportError::AlreadyListening(self.shared.root.display().to_string()));
        }
        fs::create_dir_all(&self.shared.root)?;
        let (sender, receiver) = mpsc::channel();
        let root = self.shared.root.clone();
        let worker = thread::Builder::new()
            .name(format!("listener {}", root.display()))
            .spawn(move || serve(root, handler, receiver))?;
        *inbox = Some(sender);
        debug!("listening on {}", self.shared.root.display());
        Ok(Listener {
            shared: self.shared.clone(),
            worker: Some(worker),
        })
    }
}

impl TransportEndpoint for LocalEndpoint {
    fn list(&self) -> Result<Vec<ObjectInfo>, TransportError> {
        if !self.is_listening() {
            return Err(self.shared.unreachable());
        }
        let mut objects = Vec::new();
        for entry in fs::read_dir(&self.shared.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            objects.push(ObjectInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
            });
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    fn write(&self, name: &str, mode: WriteMode, data: Vec<u8>) -> Result<(), TransportError> {
        validate_name(name)?;
        let inbox = self.shared.inbox().ok_or_else(|| self.shared.unreachable())?;
        let (reply, ack) = mpsc::channel();
        inbox
            .send(Request {
                upload: Upload {
                    name: name.to_string(),
                    mode,
                    data,
                },
                reply,
            })
            .map_err(|_| TransportError::Closed)?;
        drop(inbox);
        ack.recv().map_err(|_| TransportError::Closed)?
    }
}

/// Running listener of a [`LocalEndpoint`]. Dropping it stops the listener.
pub struct Listener {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Listener {
    /// Stops accepting writes and waits for the ones in flight.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.inbox.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("listener on {} panicked", self.shared.root.display());
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn validate_name(name: &str) -> Result<(), TransportError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(TransportError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn serve(root: PathBuf, handler: Arc<dyn UploadHandler>, inbox: mpsc::Receiver<Request>) {
    for Request { upload, reply } in inbox {
        let result = receive(&root, handler.as_ref(), &upload);
        if let Err(err) = &result {
            warn!("failed to receive {} on {}: {}", upload.name, root.display(), err);
        }
        // the writer may have given up waiting
        let _ = reply.send(result);
    }
    debug!("listener on {} stopped", root.display());
}

fn receive(root: &Path, handler: &dyn UploadHandler, upload: &Upload) -> Result<(), TransportError> {
    let staging = root.join(STAGING_DIR);
    fs::create_dir_all(&staging)?;
    let staged = staging.join(&upload.name);
    {
        let mut file = match upload.mode {
            WriteMode::Create => File::create(&staged)?,
            WriteMode::Append => OpenOptions::new().create(true).append(true).open(&staged)?,
        };
        file.write_all(&upload.data)?;
    }
    let handled = handler.on_upload(upload);
    if let Err(err) = fs::remove_file(&staged) {
        warn!("failed to remove staged {}: {}", staged.display(), err);
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<(String, WriteMode, Vec<u8>)>>);

    impl UploadHandler for Recorder {
        fn on_upload(&self, upload: &Upload) -> Result<(), TransportError> {
            if upload.data.is_empty() {
                return Err(TransportError::Rejected("empty write".to_string()));
            }
            self.0
                .lock()
                .unwrap()
                .push((upload.name.clone(), upload.mode, upload.data.clone()));
            Ok(())
        }
    }

    #[test]
    fn write_requires_listener() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = LocalEndpoint::new(dir.path());
        assert!(matches!(
            endpoint.write("a", WriteMode::Create, vec![1]),
            Err(TransportError::Unreachable(_))
        ));
        assert!(matches!(endpoint.list(), Err(TransportError::Unreachable(_))));
    }

    #[test]
    fn writes_reach_handler_and_leave_no_staged_objects() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = LocalEndpoint::new(dir.path());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let listener = endpoint.listen(recorder.clone()).unwrap();

        endpoint.write("a.bin", WriteMode::Create, b"abc".to_vec()).unwrap();
        endpoint.write("a.bin", WriteMode::Append, b"de".to_vec()).unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                ("a.bin".to_string(), WriteMode::Create, b"abc".to_vec()),
                ("a.bin".to_string(), WriteMode::Append, b"de".to_vec()),
            ]
        );
        assert_eq!(fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count(), 0);

        listener.shutdown();
        assert!(!endpoint.is_listening());
        assert!(endpoint.write("a.bin", WriteMode::Append, vec![1]).is_err());
    }

    #[test]
    fn handler_refusal_fails_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = LocalEndpoint::new(dir.path());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let _listener = endpoint.listen(recorder.clone()).unwrap();

        assert!(matches!(
            endpoint.write("a.bin", WriteMode::Create, Vec::new()),
            Err(TransportError::Rejected(reason)) if reason == "empty write"
        ));
        assert!(recorder.0.lock().unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn listing_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), b"12345").unwrap();
        fs::create_dir(dir.path().join(STAGING_DIR)).unwrap();
        let endpoint = LocalEndpoint::new(dir.path());
        let _listener = endpoint.listen(Arc::new(Recorder(Mutex::new(Vec::new())))).unwrap();
        assert_eq!(
            endpoint.list().unwrap(),
            vec![ObjectInfo {
                name: "x".to_string(),
                size: 5
            }]
        );
    }

    #[test]
    fn second_listener_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = LocalEndpoint::new(dir.path());
        let handler = Arc::new(Recorder(Mutex::new(Vec::new())));
        let _listener = endpoint.listen(handler.clone()).unwrap();
        assert!(matches!(
            endpoint.listen(handler),
            Err(TransportError::AlreadyListening(_))
        ));
    }

    #[test]
    fn rejects_path_like_names() {
        for name in ["", ".staging", "../x", "a/b"] {
            assert!(matches!(validate_name(name), Err(TransportError::InvalidName(_))));
        }
        assert!(validate_name("a.bin").is_ok());
    }
}
