//! Simulated node: virtual disk, scalar memory and a transfer endpoint.
//!
//! All mutable state of a node sits behind one mutex. It is shared by the command
//! path ([`NodeRuntime`] methods) and by the listener thread delivering incoming
//! transfers, so every admission check and the mutation following it happen under
//! the same lock.

use std::{
    fmt,
    io::ErrorKind,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, error, info, warn};

use vnode_transfer::{
    transport::Listener, LocalEndpoint, NetworkDirectory, TransferConfig, TransferReceiver, TransferReport,
    TransferSender, TransferSink,
};

use crate::{
    disk::{DiskEntry, VirtualDisk},
    error::NodeError,
    instruction::Instruction,
    memory::{parse_integer, MemoryStore},
    metadata::{DiskRecord, JsonMetadataStore, MetadataStore},
    storage::{validate_name, StorageRoot},
    system::NodeConfig,
};

struct NodeState {
    running: bool,
    disk: VirtualDisk,
    memory: MemoryStore,
    storage: StorageRoot,
    metadata: Box<dyn MetadataStore>,
}

impl NodeState {
    /// Saves the disk record. Failures are logged and otherwise ignored.
    fn persist(&self, id: &str) {
        let record = DiskRecord::new(self.disk.entries().to_vec());
        match self.metadata.save(&record) {
            Ok(()) => debug!("{}: saved metadata for {} files", id, record.files.len()),
            Err(err) => error!("{}: failed to save metadata: {}", id, err),
        }
    }
}

fn lock(state: &Mutex<NodeState>) -> MutexGuard<'_, NodeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of [NodeRuntime::start] and [NodeRuntime::stop].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Started(String),
    AlreadyRunning(String),
    Stopped(String),
    AlreadyStopped(String),
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Started(id) => write!(f, "VM {id} started"),
            Lifecycle::AlreadyRunning(id) => write!(f, "VM {id} is already running"),
            Lifecycle::Stopped(id) => write!(f, "VM {id} stopped"),
            Lifecycle::AlreadyStopped(id) => write!(f, "VM {id} is already stopped"),
        }
    }
}

/// Disk contents in insertion order. An empty disk is reported explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Empty,
    Files(Vec<DiskEntry>),
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listing::Empty => write!(f, "Directory is empty"),
            Listing::Files(files) => {
                for (i, file) in files.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}: {} bytes", file.name, file.size)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchOutcome {
    Created(DiskEntry),
    /// The file existed, only its timestamp changed.
    Touched(String),
}

impl fmt::Display for TouchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TouchOutcome::Created(entry) => write!(f, "Created file: {} with {} bytes", entry.name, entry.size),
            TouchOutcome::Touched(name) => write!(f, "Updated timestamp for file: {name}"),
        }
    }
}

/// Stores files completed by the node's receiver.
struct DiskSink {
    node: String,
    state: Arc<Mutex<NodeState>>,
}

impl TransferSink for DiskSink {
    type Error = NodeError;

    fn finalize(&self, filename: &str, data: Vec<u8>) -> Result<u64, NodeError> {
        validate_name(filename)?;
        let mut state = lock(&self.state);
        if state.disk.contains(filename) {
            return Err(NodeError::Duplicate {
                filename: filename.to_string(),
                target: self.node.clone(),
            });
        }
        let size = data.len() as u64;
        state.disk.admit(size as i128)?;
        state.storage.write(filename, &data)?;
        state.disk.insert(filename, size);
        state.persist(&self.node);
        Ok(size)
    }
}

pub struct NodeRuntime {
    id: String,
    address: String,
    state: Arc<Mutex<NodeState>>,
    endpoint: LocalEndpoint,
    receiver: Arc<TransferReceiver<DiskSink>>,
    listener: Mutex<Option<Listener>>,
    directory: Arc<NetworkDirectory>,
    sender: TransferSender,
}

impl NodeRuntime {
    /// Creates a stopped node keeping its metadata in the storage root.
    ///
    /// `endpoint` must serve the node's storage root and is the one other nodes
    /// reach it through via `directory`.
    pub fn new(
        config: &NodeConfig,
        transfer: &TransferConfig,
        endpoint: LocalEndpoint,
        directory: Arc<NetworkDirectory>,
    ) -> Result<Self, NodeError> {
        let metadata = Box::new(JsonMetadataStore::in_root(&config.storage_root));
        Self::with_metadata(config, transfer, endpoint, directory, metadata)
    }

    pub fn with_metadata(
        config: &NodeConfig,
        transfer: &TransferConfig,
        endpoint: LocalEndpoint,
        directory: Arc<NetworkDirectory>,
        metadata: Box<dyn MetadataStore>,
    ) -> Result<Self, NodeError> {
        let storage = StorageRoot::open(&config.storage_root)?;

        let files = match metadata.load() {
            Ok(Some(record)) => record.files,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("{}: {}, starting with an empty disk", config.id, err);
                Vec::new()
            }
        };
        let mut disk = VirtualDisk::with_entries(config.capacity, files);
        match storage.scan() {
            Ok(present) => {
                for file in present {
                    if disk.get(&file.name) != Some(file.size) {
                        debug!("{}: found {} ({} bytes) in storage root", config.id, file.name, file.size);
                        disk.insert(&file.name, file.size);
                    }
                }
            }
            Err(err) => warn!("{}: can't scan {}: {}", config.id, storage.root().display(), err),
        }
        if disk.used() > disk.capacity() {
            warn!(
                "{}: stored files take {} bytes, more than the capacity of {} bytes",
                config.id,
                disk.used(),
                disk.capacity()
            );
        }

        let state = NodeState {
            running: false,
            disk,
            memory: MemoryStore::new(),
            storage,
            metadata,
        };
        state.persist(&config.id);
        let state = Arc::new(Mutex::new(state));
        let receiver = Arc::new(TransferReceiver::new(
            transfer,
            DiskSink {
                node: config.id.clone(),
                state: state.clone(),
            },
        )?);

        Ok(Self {
            id: config.id.clone(),
            address: config.address.clone(),
            state,
            endpoint,
            receiver,
            listener: Mutex::new(None),
            directory,
            sender: TransferSender::new(transfer.clone()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Snapshot of the virtual disk.
    pub fn disk(&self) -> VirtualDisk {
        lock(&self.state).disk.clone()
    }

    fn running_state(&self) -> Result<MutexGuard<'_, NodeState>, NodeError> {
        let state = lock(&self.state);
        if !state.running {
            return Err(NodeError::NotRunning(self.id.clone()));
        }
        Ok(state)
    }

    /// Starts accepting commands and incoming transfers.
    pub fn start(&self) -> Result<Lifecycle, NodeError> {
        let mut state = lock(&self.state);
        if state.running {
            return Ok(Lifecycle::AlreadyRunning(self.id.clone()));
        }
        let listener = self
            .endpoint
            .listen(self.receiver.clone())
            .map_err(|source| NodeError::Transport {
                node: self.id.clone(),
                source,
            })?;
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
        state.running = true;
        info!("VM {} started", self.id);
        Ok(Lifecycle::Started(self.id.clone()))
    }

    /// Releases the listener and persists the disk.
    pub fn stop(&self) -> Lifecycle {
        {
            let mut state = lock(&self.state);
            if !state.running {
                return Lifecycle::AlreadyStopped(self.id.clone());
            }
            state.running = false;
        }
        // the listener may be finalizing a transfer, which needs the state lock
        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(listener) = listener {
            listener.shutdown();
        }
        lock(&self.state).persist(&self.id);
        info!("VM {} stopped", self.id);
        Lifecycle::Stopped(self.id.clone())
    }

    pub fn list(&self) -> Result<Listing, NodeError> {
        let state = self.running_state()?;
        if state.disk.is_empty() {
            return Ok(Listing::Empty);
        }
        Ok(Listing::Files(state.disk.entries().to_vec()))
    }

    /// Creates `filename` with `size` zero bytes, or refreshes its timestamp if it exists.
    pub fn touch(&self, filename: &str, size: u64) -> Result<TouchOutcome, NodeError> {
        let mut state = self.running_state()?;
        validate_name(filename)?;
        if let Some(current) = state.disk.get(filename) {
            match state.storage.touch(filename) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    warn!("{}: backing object of {} is missing, recreating it", self.id, filename);
                    state.storage.allocate(filename, current)?;
                }
                Err(err) => return Err(err.into()),
            }
            return Ok(TouchOutcome::Touched(filename.to_string()));
        }
        state.disk.admit(i128::from(size))?;
        state.storage.allocate(filename, size)?;
        state.disk.insert(filename, size);
        state.persist(&self.id);
        Ok(TouchOutcome::Created(DiskEntry::new(filename, size)))
    }

    /// Resizes an existing file to exactly `size` bytes.
    pub fn trunc(&self, filename: &str, size: u64) -> Result<DiskEntry, NodeError> {
        let mut state = self.running_state()?;
        let current = state
            .disk
            .get(filename)
            .ok_or_else(|| NodeError::FileNotFound(filename.to_string()))?;
        state.disk.admit(i128::from(size) - i128::from(current))?;
        state.storage.allocate(filename, size)?;
        state.disk.insert(filename, size);
        state.persist(&self.id);
        Ok(DiskEntry::new(filename, size))
    }

    /// Stores `value` under `name`. The value must be an integer.
    pub fn set_var(&self, name: &str, value: &str) -> Result<i64, NodeError> {
        let mut state = self.running_state()?;
        let value = parse_integer(value)?;
        state.memory.set(name, value);
        Ok(value)
    }

    pub fn get_var(&self, name: &str) -> Result<i64, NodeError> {
        self.running_state()?.memory.read(name)
    }

    /// Decodes and runs one instruction, returning its result.
    pub fn execute(&self, opcode: &str, args: &[&str]) -> Result<i64, NodeError> {
        self.running_state()?;
        self.run_instruction(&Instruction::new(opcode, args)?)
    }

    pub fn run_instruction(&self, instruction: &Instruction) -> Result<i64, NodeError> {
        let mut state = self.running_state()?;
        instruction.execute(&mut state.memory)
    }

    /// Sends a copy of `filename` to the node `target` names (id or address).
    ///
    /// Blocks until the whole file is delivered.
    pub fn send(&self, filename: &str, target: &str) -> Result<TransferReport, NodeError> {
        let data = {
            let state = self.running_state()?;
            if target == self.id || target == self.address {
                return Err(NodeError::SelfTarget);
            }
            if self.directory.resolve(target).is_none() {
                return Err(NodeError::UnknownTarget(target.to_string()));
            }
            if !state.disk.contains(filename) {
                return Err(NodeError::FileNotFound(filename.to_string()));
            }
            state.storage.read(filename)?
        };
        Ok(self.sender.send(&self.directory, target, filename, &data)?)
    }
}

impl fmt::Display for NodeRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        write!(
            f,
            "VirtualNode({}, IP: {}, Status: {}, Files: {}, Memory: {} variables)",
            self.id,
            self.address,
            if state.running { "running" } else { "stopped" },
            state.disk.len(),
            state.memory.len()
        )
    }
}
