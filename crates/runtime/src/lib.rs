#![doc = include_str!("../../../README.md")]

pub mod command;
pub mod disk;
pub mod error;
pub mod fleet;
pub mod instruction;
pub mod memory;
pub mod metadata;
pub mod node;
pub mod parser;
pub mod script;
pub mod storage;
pub mod system;
