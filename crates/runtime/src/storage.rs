//! Backing objects of a virtual disk in a host directory.

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use vnode_transfer::{METADATA_MARKER, STAGING_DIR};

use crate::{disk::DiskEntry, error::NodeError};

pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    /// Opens `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates or resizes `name` to exactly `size` bytes. New bytes are zero.
    pub fn allocate(&self, name: &str, size: u64) -> Result<(), NodeError> {
        validate_name(name)?;
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(self.path(name))?;
        file.set_len(size)?;
        Ok(())
    }

    /// Updates the modification time of an existing object.
    pub fn touch(&self, name: &str) -> io::Result<()> {
        File::options()
            .write(true)
            .open(self.path(name))?
            .set_modified(SystemTime::now())
    }

    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path(name))
    }

    pub fn write(&self, name: &str, data: &[u8]) -> Result<(), NodeError> {
        validate_name(name)?;
        fs::write(self.path(name), data)?;
        Ok(())
    }

    /// Regular files present in the root, except the metadata marker, sorted by name.
    pub fn scan(&self) -> io::Result<Vec<DiskEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !metadata.is_file() || name == METADATA_MARKER || name == STAGING_DIR {
                continue;
            }
            entries.push(DiskEntry {
                name,
                size: metadata.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// File names must be plain names inside the storage root.
pub fn validate_name(name: &str) -> Result<(), NodeError> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) || name == METADATA_MARKER {
        return Err(NodeError::InvalidArguments(format!("Invalid file name {name:?}")));
    }
    Ok(())
}
