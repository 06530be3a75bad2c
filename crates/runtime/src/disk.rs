//! Capacity-bounded virtual disk of a node.

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// One file on a virtual disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskEntry {
    pub name: String,
    pub size: u64,
}

impl DiskEntry {
    pub fn new(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            size,
        }
    }
}

/// Files of a node in insertion order, together with the node's fixed capacity.
///
/// Admission is checked against the current usage before every mutation, there
/// are no reservations.
#[derive(Debug, Clone)]
pub struct VirtualDisk {
    capacity: u64,
    entries: Vec<DiskEntry>,
}

impl VirtualDisk {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    /// Disk holding `entries`. A name occurring twice keeps its last size.
    pub fn with_entries(capacity: u64, entries: Vec<DiskEntry>) -> Self {
        let mut disk = Self::new(capacity);
        for entry in entries {
            disk.insert(&entry.name, entry.size);
        }
        disk
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Sum of all file sizes, saturating at `u64::MAX`.
    pub fn used(&self) -> u64 {
        self.entries.iter().fold(0, |used, entry| used.saturating_add(entry.size))
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|entry| entry.name == name).map(|entry| entry.size)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn entries(&self) -> &[DiskEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that changing the usage by `delta` bytes stays within capacity.
    /// Shrinking is always admitted.
    pub fn admit(&self, delta: i128) -> Result<(), NodeError> {
        let used = self.used();
        if delta > 0 && used as i128 + delta > self.capacity as i128 {
            return Err(NodeError::Capacity {
                used,
                requested: u64::try_from(delta).unwrap_or(u64::MAX),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Sets the size of `name`, adding it at the end if absent. Returns the previous size.
    pub fn insert(&mut self, name: &str, size: u64) -> Option<u64> {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => Some(std::mem::replace(&mut entry.size, size)),
            None => {
                self.entries.push(DiskEntry::new(name, size));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut disk = VirtualDisk::new(1000);
        assert_eq!(disk.insert("b", 10), None);
        assert_eq!(disk.insert("a", 20), None);
        assert_eq!(disk.insert("b", 30), Some(10));
        assert_eq!(disk.entries(), &[DiskEntry::new("b", 30), DiskEntry::new("a", 20)]);
        assert_eq!(disk.used(), 50);
    }

    #[test]
    fn admission_boundary() {
        let mut disk = VirtualDisk::new(100);
        disk.insert("a", 60);
        assert!(disk.admit(40).is_ok());
        assert!(matches!(
            disk.admit(41),
            Err(NodeError::Capacity {
                used: 60,
                requested: 41,
                capacity: 100
            })
        ));
        assert!(disk.admit(-60).is_ok());
    }

    #[test]
    fn shrinking_is_admitted_even_when_over_capacity() {
        let disk = VirtualDisk::with_entries(10, vec![DiskEntry::new("a", 50)]);
        assert!(disk.admit(-1).is_ok());
        assert!(disk.admit(0).is_ok());
        assert!(disk.admit(1).is_err());
    }

    #[test]
    fn usage_saturates() {
        let disk = VirtualDisk::with_entries(100, vec![DiskEntry::new("a", u64::MAX), DiskEntry::new("b", 1)]);
        assert_eq!(disk.used(), u64::MAX);
        assert!(disk.admit(-1).is_ok());
        assert!(matches!(disk.admit(1), Err(NodeError::Capacity { used: u64::MAX, .. })));
    }

    #[test]
    fn duplicate_entries_collapse() {
        let disk = VirtualDisk::with_entries(100, vec![DiskEntry::new("a", 1), DiskEntry::new("a", 2)]);
        assert_eq!(disk.len(), 1);
        assert_eq!(disk.get("a"), Some(2));
    }
}
