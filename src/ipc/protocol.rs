//! Wire format and schema validation for control-socket messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted request line (1 MiB).
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default HISTORY limit when the client sends none.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("request too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One request: `{"command": <string>, "params": <object-or-null>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// One response: `{"data": <value>}` on success, `{"error": <string>}` on
/// failure. Externally tagged so the JSON shape falls straight out of serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    #[serde(rename = "data")]
    Data(serde_json::Value),
    #[serde(rename = "error")]
    Error(String),
}

/// Parsed, validated command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    ConfigGet,
    ConfigSet {
        name: String,
        value: serde_json::Value,
    },
    History {
        limit: usize,
        since: Option<u64>,
    },
}

impl Request {
    pub fn new(command: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            command: command.to_string(),
            params,
        }
    }

    /// Validate shape and extract the typed command.
    pub fn parse_command(&self) -> Result<Command, ProtocolError> {
        match self.command.as_str() {
            "STATUS" => Ok(Command::Status),
            "CONFIG_GET" => Ok(Command::ConfigGet),
            "CONFIG_SET" => {
                let params = self
                    .params
                    .as_ref()
                    .ok_or(ProtocolError::MissingParam("params"))?;
                let name = params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or(ProtocolError::MissingParam("name"))?
                    .to_string();
                let value = params
                    .get("value")
                    .cloned()
                    .ok_or(ProtocolError::MissingParam("value"))?;
                Ok(Command::ConfigSet { name, value })
            }
            "HISTORY" => {
                let limit = self
                    .params
                    .as_ref()
                    .and_then(|p| p.get("limit"))
                    .and_then(|v| v.as_u64())
                    .map(|v| v as usize)
                    .unwrap_or(DEFAULT_HISTORY_LIMIT);
                let since = self
                    .params
                    .as_ref()
                    .and_then(|p| p.get("since"))
                    .and_then(|v| v.as_u64());
                Ok(Command::History { limit, since })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Decode one request line.
pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::TooLarge {
            size: line.len(),
            max: MAX_LINE_BYTES,
        });
    }
    serde_json::from_str(line)
        .map_err(|e| ProtocolError::InvalidRequest(e.to_string()))
}

/// Encode one response as a single JSON line (no trailing newline).
pub fn encode_response(response: &Response) -> String {
    serde_json::to_string(response)
        .unwrap_or_else(|_| r#"{"error":"response serialization failed"}"#.to_string())
}
