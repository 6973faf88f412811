//! Client command parsing and server replies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::Provider;

use super::types::StatusSnapshot;

/// A command as sent by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCommand {
    pub provider: String,
    pub action: String,
}

/// What a client asks a provider's builder to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Cancel,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Cancel => "cancel",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "cancel" => Ok(Self::Cancel),
            "status" => Ok(Self::Status),
            _ => Err(CommandError::UnknownAction(s.to_string())),
        }
    }
}

/// A validated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub provider: Provider,
    pub action: Action,
}

/// Why a client message was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Malformed(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl ClientCommand {
    pub fn new(provider: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            action: action.into(),
        }
    }

    /// Validate provider and action.
    pub fn validate(&self) -> Result<Command, CommandError> {
        let provider = self
            .provider
            .parse::<Provider>()
            .map_err(|e| CommandError::UnknownProvider(e.0))?;
        let action = self.action.parse()?;
        Ok(Command { provider, action })
    }
}

/// Parse and validate a text frame.
pub fn parse_command(text: &str) -> Result<Command, CommandError> {
    let raw: ClientCommand =
        serde_json::from_str(text).map_err(|e| CommandError::Malformed(e.to_string()))?;
    raw.validate()
}

/// Error reply, `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Anything the server sends on the status socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Error(ErrorReply),
    Snapshot(StatusSnapshot),
}

impl ServerMessage {
    pub fn error(error: impl ToString) -> Self {
        Self::Error(ErrorReply::new(error))
    }

    pub fn to_json(&self) -> String {
        // Plain data with string map keys; encoding cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
