//! Instruction set of the simulated CPU.
//!
//! Every opcode owns an entry in the dispatch table below: its mnemonic, its
//! operands and the function executing it. Supporting a new instruction means
//! adding a variant to [Opcode] and filling in those three.

use std::str::FromStr;

use crate::{
    error::NodeError,
    memory::{MemoryStore, RESULT_VARIABLE},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// `add <var1> <var2>`: stores `var1 + var2` into `result`.
    Add,
}

type Handler = fn(&mut MemoryStore, &[String]) -> Result<i64, NodeError>;

impl Opcode {
    pub const ALL: &'static [Opcode] = &[Opcode::Add];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
        }
    }

    /// Names of the operands, used for arity checks and usage messages.
    pub fn operands(self) -> &'static [&'static str] {
        match self {
            Opcode::Add => &["var1", "var2"],
        }
    }

    fn handler(self) -> Handler {
        match self {
            Opcode::Add => add,
        }
    }

    pub fn usage(self) -> String {
        std::iter::once(self.mnemonic().to_string())
            .chain(self.operands().iter().map(|operand| format!("<{operand}>")))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FromStr for Opcode {
    type Err = NodeError;

    /// Mnemonics are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|opcode| opcode.mnemonic().eq_ignore_ascii_case(s))
            .ok_or_else(|| NodeError::UnknownInstruction(s.to_string()))
    }
}

/// A decoded instruction with its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<String>,
}

impl Instruction {
    pub fn new(opcode: &str, operands: &[&str]) -> Result<Self, NodeError> {
        let opcode: Opcode = opcode.parse()?;
        if operands.len() != opcode.operands().len() {
            return Err(NodeError::InvalidArguments(format!("Usage: {}", opcode.usage())));
        }
        Ok(Self {
            opcode,
            operands: operands.iter().map(|operand| operand.to_string()).collect(),
        })
    }

    pub fn execute(&self, memory: &mut MemoryStore) -> Result<i64, NodeError> {
        (self.opcode.handler())(memory, &self.operands)
    }

    /// Human-readable report of an executed instruction.
    pub fn summary(&self, result: i64) -> String {
        match self.opcode {
            Opcode::Add => format!(
                "Added {} + {}, stored {} = {}",
                self.operands[0], self.operands[1], RESULT_VARIABLE, result
            ),
        }
    }
}

fn add(memory: &mut MemoryStore, operands: &[String]) -> Result<i64, NodeError> {
    let lhs = memory.read(&operands[0])?;
    let rhs = memory.read(&operands[1])?;
    let result = lhs
        .checked_add(rhs)
        .ok_or_else(|| NodeError::Type(format!("{} + {} overflows a 64-bit integer", operands[0], operands[1])))?;
    memory.set(RESULT_VARIABLE, result);
    Ok(result)
}
