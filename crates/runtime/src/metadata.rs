//! Persistence of the virtual disk contents.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use vnode_transfer::METADATA_MARKER;

use crate::{disk::DiskEntry, error::PersistenceError};

pub const DISK_RECORD_VERSION: u32 = 1;

/// Serialized form of a virtual disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRecord {
    pub version: u32,
    pub files: Vec<DiskEntry>,
}

impl DiskRecord {
    pub fn new(files: Vec<DiskEntry>) -> Self {
        Self {
            version: DISK_RECORD_VERSION,
            files,
        }
    }
}

/// Shapes accepted when loading. Flat `{"name": size}` maps are migrated in
/// document order.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Versioned(DiskRecord),
    Legacy(IndexMap<String, u64>),
}

/// Key-value persistence of one node's disk record.
pub trait MetadataStore: Send {
    /// Returns `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<DiskRecord>, PersistenceError>;

    fn save(&self, record: &DiskRecord) -> Result<(), PersistenceError>;
}

/// JSON document at a fixed path, by default the metadata marker of a storage root.
pub struct JsonMetadataStore {
    path: PathBuf,
}

impl JsonMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(METADATA_MARKER))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// A record whose sizes can't be summed can't describe any disk.
    fn checked(&self, record: DiskRecord) -> Result<DiskRecord, PersistenceError> {
        match record.files.iter().try_fold(0u64, |total, file| total.checked_add(file.size)) {
            Some(_) => Ok(record),
            None => Err(PersistenceError::SizeOverflow {
                path: self.path.display().to_string(),
            }),
        }
    }
}

impl MetadataStore for JsonMetadataStore {
    fn load(&self) -> Result<Option<DiskRecord>, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let stored: StoredRecord = serde_json::from_str(&content).map_err(|source| PersistenceError::Malformed {
            path: self.path.display().to_string(),
            source,
        })?;
        let record = match stored {
            StoredRecord::Versioned(record) if record.version == DISK_RECORD_VERSION => record,
            StoredRecord::Versioned(record) => return Err(PersistenceError::UnsupportedVersion(record.version)),
            StoredRecord::Legacy(files) => {
                DiskRecord::new(files.into_iter().map(|(name, size)| DiskEntry { name, size }).collect())
            }
        };
        self.checked(record).map(Some)
    }

    fn save(&self, record: &DiskRecord) -> Result<(), PersistenceError> {
        let content = serde_json::to_string_pretty(record).map_err(|source| PersistenceError::Malformed {
            path: self.path.display().to_string(),
            source,
        })?;
        fs::write(&self.path, content).map_err(|err| self.io_error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(JsonMetadataStore::in_root(dir.path()).load().unwrap(), None);
    }

    #[test]
    fn saved_record_is_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::in_root(dir.path());
        let record = DiskRecord::new(vec![DiskEntry::new("b", 2), DiskEntry::new("a", 1)]);
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));
    }

    #[test]
    fn flat_map_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::in_root(dir.path());
        fs::write(store.path(), r#"{"a.bin": 1000, "b.bin": 0}"#).unwrap();
        assert_eq!(
            store.load().unwrap(),
            Some(DiskRecord::new(vec![DiskEntry::new("a.bin", 1000), DiskEntry::new("b.bin", 0)]))
        );
    }

    #[test]
    fn flat_map_keeps_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::in_root(dir.path());
        fs::write(store.path(), r#"{"z.bin": 1, "a.bin": 2, "m.bin": 3}"#).unwrap();
        let names = store
            .load()
            .unwrap()
            .unwrap()
            .files
            .into_iter()
            .map(|file| file.name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["z.bin", "a.bin", "m.bin"]);
    }

    #[test]
    fn overflowing_sizes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::in_root(dir.path());

        fs::write(store.path(), format!(r#"{{"a.bin": {}, "b.bin": 1}}"#, u64::MAX)).unwrap();
        assert!(matches!(store.load(), Err(PersistenceError::SizeOverflow { .. })));

        store
            .save(&DiskRecord::new(vec![DiskEntry::new("a", u64::MAX - 1), DiskEntry::new("b", 2)]))
            .unwrap();
        assert!(matches!(store.load(), Err(PersistenceError::SizeOverflow { .. })));

        fs::write(store.path(), format!(r#"{{"a.bin": {}, "b.bin": 0}}"#, u64::MAX)).unwrap();
        assert_eq!(
            store.load().unwrap(),
            Some(DiskRecord::new(vec![DiskEntry::new("a.bin", u64::MAX), DiskEntry::new("b.bin", 0)]))
        );
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMetadataStore::in_root(dir.path());

        fs::write(store.path(), r#"{"a.bin": -5}"#).unwrap();
        assert!(matches!(store.load(), Err(PersistenceError::Malformed { .. })));

        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(PersistenceError::Malformed { .. })));

        fs::write(store.path(), r#"{"version": 7, "files": []}"#).unwrap();
        assert!(matches!(store.load(), Err(PersistenceError::UnsupportedVersion(7))));
    }
}
