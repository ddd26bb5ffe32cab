use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RelayError, Result};

/// Movement commands understood by the clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Up,
    Down,
    Left,
    Right,
}

impl Command {
    pub const ALL: [Command; 4] = [Command::Up, Command::Down, Command::Left, Command::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Up => "up",
            Command::Down => "down",
            Command::Left => "left",
            Command::Right => "right",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape published by the producer: `{"command": "up"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub command: Command,
}

impl CommandMessage {
    pub fn new(command: Command) -> Self {
        Self { command }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A validated queue payload. Clients receive `text` verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCommand {
    pub command: Command,
    pub text: String,
}

/// Decode a raw queue payload
pub fn decode_command(data: &[u8]) -> Result<DecodedCommand> {
    let text = std::str::from_utf8(data)
        .map_err(|e| RelayError::MessageParseError(format!("Payload is not UTF-8: {}", e)))?;

    // Struct deserialization also accepts arrays, so check the shape first
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(RelayError::MessageParseError(
            "Payload is not a JSON object".to_string(),
        ));
    }
    let message: CommandMessage = serde_json::from_value(value)?;

    Ok(DecodedCommand {
        command: message.command,
        text: text.to_string(),
    })
}
