//! Text command surface of a node.
//!
//! Every command produces exactly one human-readable status text, errors included.

use std::str::FromStr;

use crate::{
    error::NodeError,
    instruction::{Instruction, Opcode},
    node::NodeRuntime,
};

pub const HELP: &str = "\
Commands:
  ls                         list files on the virtual disk
  touch <filename> [size]    create a file of size bytes, or update its timestamp
  trunc <filename> [size]    resize an existing file
  send <filename> <target>   copy a file to another node (id or address)
  set <var> <value>          store an integer in memory
  get <var>                  read a variable from memory
  add <var1> <var2>          store var1 + var2 into result
  start | stop               start or stop the node
  help                       show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Touch { filename: String, size: u64 },
    Truncate { filename: String, size: u64 },
    Send { filename: String, target: String },
    Set { name: String, value: String },
    Get { name: String },
    Execute(Instruction),
    Start,
    Stop,
    Help,
}

fn parse_size(size: Option<&str>) -> Result<u64, NodeError> {
    let Some(size) = size else {
        return Ok(0);
    };
    let size: i128 = size
        .parse()
        .map_err(|_| NodeError::Type("Size must be an integer".to_string()))?;
    if size < 0 {
        return Err(NodeError::Type("Size cannot be negative".to_string()));
    }
    u64::try_from(size).map_err(|_| NodeError::Type("Size must be an integer".to_string()))
}

fn usage(text: &str) -> NodeError {
    NodeError::InvalidArguments(format!("Usage: {text}"))
}

impl FromStr for Command {
    type Err = NodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        let Some((&name, args)) = tokens.split_first() else {
            return Err(NodeError::UnknownCommand(String::new()));
        };
        let command = match (name.to_ascii_lowercase().as_str(), args) {
            ("ls", []) => Command::List,
            ("touch", [filename, rest @ ..]) if rest.len() <= 1 => Command::Touch {
                filename: filename.to_string(),
                size: parse_size(rest.first().copied())?,
            },
            ("touch", _) => return Err(usage("touch <filename> [size]")),
            ("trunc", [filename, rest @ ..]) if rest.len() <= 1 => Command::Truncate {
                filename: filename.to_string(),
                size: parse_size(rest.first().copied())?,
            },
            ("trunc", _) => return Err(usage("trunc <filename> [size]")),
            ("send", [filename, target]) => Command::Send {
                filename: filename.to_string(),
                target: target.to_string(),
            },
            ("send", _) => return Err(usage("send <filename> <target>")),
            ("set", [name, value]) => Command::Set {
                name: name.to_string(),
                value: value.to_string(),
            },
            ("set", _) => return Err(usage("set <var> <value>")),
            ("get", [name]) => Command::Get { name: name.to_string() },
            ("get", _) => return Err(usage("get <var>")),
            ("start", []) => Command::Start,
            ("stop", []) => Command::Stop,
            ("help", _) => Command::Help,
            _ => match Opcode::from_str(name) {
                Ok(opcode) => Command::Execute(Instruction::new(opcode.mnemonic(), args)?),
                Err(_) => return Err(NodeError::UnknownCommand(line.trim().to_string())),
            },
        };
        Ok(command)
    }
}

impl Command {
    /// Runs the command on `node`, rendering the outcome.
    pub fn run(&self, node: &NodeRuntime) -> String {
        let result = match self {
            Command::List => node.list().map(|listing| listing.to_string()),
            Command::Touch { filename, size } => node.touch(filename, *size).map(|outcome| outcome.to_string()),
            Command::Truncate { filename, size } => node
                .trunc(filename, *size)
                .map(|entry| format!("Truncated {} to {} bytes", entry.name, entry.size)),
            Command::Send { filename, target } => node.send(filename, target).map(|report| report.to_string()),
            Command::Set { name, value } => node
                .set_var(name, value)
                .map(|value| format!("Set {name} = {value} in memory")),
            Command::Get { name } => node.get_var(name).map(|value| format!("{name} = {value}")),
            Command::Execute(instruction) => node
                .run_instruction(instruction)
                .map(|result| instruction.summary(result)),
            Command::Start => node.start().map(|lifecycle| lifecycle.to_string()),
            Command::Stop => Ok(node.stop().to_string()),
            Command::Help => Ok(HELP.to_string()),
        };
        result.unwrap_or_else(|err| format!("Error: {err}"))
    }
}

/// Parses and runs one input line. Blank lines produce no output.
pub fn execute_line(node: &NodeRuntime, line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }
    Some(match line.parse::<Command>() {
        Ok(command) => command.run(node),
        Err(err) => format!("Error: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("ls".parse::<Command>().unwrap(), Command::List);
        assert_eq!(
            "touch a.bin".parse::<Command>().unwrap(),
            Command::Touch {
                filename: "a.bin".to_string(),
                size: 0
            }
        );
        assert_eq!(
            "  trunc a.bin 10 ".parse::<Command>().unwrap(),
            Command::Truncate {
                filename: "a.bin".to_string(),
                size: 10
            }
        );
        assert_eq!(
            "ADD x y".parse::<Command>().unwrap(),
            Command::Execute(Instruction::new("add", &["x", "y"]).unwrap())
        );
        assert_eq!("STOP".parse::<Command>().unwrap(), Command::Stop);
    }

    #[test]
    fn size_errors() {
        let message = |line: &str| line.parse::<Command>().unwrap_err().to_string();
        assert_eq!(message("touch a -1"), "Size cannot be negative");
        assert_eq!(message("touch a 1.5"), "Size must be an integer");
        assert_eq!(message("trunc a big"), "Size must be an integer");
    }

    #[test]
    fn usage_errors() {
        let message = |line: &str| line.parse::<Command>().unwrap_err().to_string();
        assert_eq!(message("add x"), "Usage: add <var1> <var2>");
        assert_eq!(message("send a.bin"), "Usage: send <filename> <target>");
        assert_eq!(message("touch"), "Usage: touch <filename> [size]");
        assert!(matches!("rm a.bin".parse::<Command>(), Err(NodeError::UnknownCommand(line)) if line == "rm a.bin"));
    }
}
