//! Scalar memory of a node.

use std::collections::BTreeMap;

use crate::error::NodeError;

/// Variable the result of an instruction is written to.
pub const RESULT_VARIABLE: &str = "result";

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    cells: BTreeMap<String, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, returning the value it replaced.
    pub fn set(&mut self, name: &str, value: i64) -> Option<i64> {
        self.cells.insert(name.to_string(), value)
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.cells.get(name).copied()
    }

    /// Like [MemoryStore::get], but a missing variable is an error.
    pub fn read(&self, name: &str) -> Result<i64, NodeError> {
        self.get(name).ok_or_else(|| NodeError::VariableNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Interprets `value` as a 64-bit integer.
pub fn parse_integer(value: &str) -> Result<i64, NodeError> {
    value
        .trim()
        .parse()
        .map_err(|_| NodeError::Type(format!("Value must be an integer, got {value:?}")))
}
