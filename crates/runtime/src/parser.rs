//! Tools for loading system configurations and command scripts from YAML files.

use std::{collections::HashSet, path::Path};

use serde::de::DeserializeOwned;

use vnode_transfer::frame::FrameHeader;

use crate::{error::ConfigError, script::Script, system::SystemConfig};

fn read_yaml<T: DeserializeOwned, P: AsRef<Path>>(file: P) -> Result<T, ConfigError> {
    let path = file.as_ref().display().to_string();
    let content = std::fs::read_to_string(&file).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
}

impl SystemConfig {
    /// Read [SystemConfig] from YAML file and validate it.
    pub fn from_yaml<P: AsRef<Path>>(file: P) -> Result<Self, ConfigError> {
        let config: SystemConfig = read_yaml(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let transfer = &self.transfer;
        if transfer.chunk_count == 0 {
            return Err(ConfigError::Invalid("chunk_count must be positive".to_string()));
        }
        if transfer.bandwidth == 0 {
            return Err(ConfigError::Invalid("bandwidth must be positive".to_string()));
        }
        let Ok(chunk_count) = u32::try_from(transfer.chunk_count) else {
            return Err(ConfigError::Invalid(format!("chunk_count {} is too large", transfer.chunk_count)));
        };
        let largest = FrameHeader {
            sequence: chunk_count,
            payload_length: self.nodes.iter().map(|node| node.capacity).max().unwrap_or(0),
        };
        if largest.encode(transfer.header_size).is_err() {
            return Err(ConfigError::Invalid(format!(
                "header_size {} can't hold header {}:{}",
                transfer.header_size, largest.sequence, largest.payload_length
            )));
        }

        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid("no nodes configured".to_string()));
        }
        let mut ids = HashSet::new();
        let mut addresses = HashSet::new();
        let mut roots = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() || node.address.is_empty() {
                return Err(ConfigError::Invalid("node id and address can't be empty".to_string()));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate node id {}", node.id)));
            }
            if !addresses.insert(node.address.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate node address {}", node.address)));
            }
            if !roots.insert(node.storage_root.as_path()) {
                return Err(ConfigError::Invalid(format!(
                    "nodes share storage root {}",
                    node.storage_root.display()
                )));
            }
        }
        Ok(())
    }
}

impl Script {
    /// Read [Script] from YAML file.
    pub fn from_yaml<P: AsRef<Path>>(file: P) -> Result<Self, ConfigError> {
        read_yaml(file)
    }
}
