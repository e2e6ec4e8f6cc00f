//! IPC Protocol Types
//!
//! One connection carries one newline-terminated JSON request and one
//! newline-terminated JSON response.
//!
//! Hook request: `{"request_id"?: "...", "event": "PreToolUse", "hook_input": {...}}`
//!
//! Control request: `{"event": "_system", "action": "status"}`

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::types::{EventCategory, UnknownCategory};

/// Largest request line accepted, newline excluded
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Event name reserved for control-plane requests
pub const SYSTEM_EVENT: &str = "_system";

/// Control-plane actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemAction {
    Ping,
    Status,
    Health,
    Handlers,
    Logs,
    Config,
    Shutdown,
}

impl SystemAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Status => "status",
            Self::Health => "health",
            Self::Handlers => "handlers",
            Self::Logs => "logs",
            Self::Config => "config",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::str::FromStr for SystemAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| ProtocolError::UnknownAction(s.to_string()))
    }
}

/// Errors turning a request line into a `Request`
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request exceeds {} bytes", MAX_REQUEST_BYTES)]
    TooLarge,

    #[error("empty request")]
    Empty,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),

    #[error("unknown system action: {0}")]
    UnknownAction(String),
}

/// A protocol failure together with whatever request id could be recovered
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    pub request_id: Option<String>,
    #[source]
    pub error: ProtocolError,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    request_id: Option<Value>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    hook_input: Option<Value>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    lines: Option<usize>,
}

/// A parsed request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Hook {
        request_id: Option<String>,
        category: EventCategory,
        input: Value,
    },
    System {
        request_id: Option<String>,
        action: SystemAction,
        /// Line count for `logs`
        lines: Option<usize>,
    },
}

impl Request {
    pub fn hook(category: EventCategory, input: Value) -> Self {
        Self::Hook {
            request_id: None,
            category,
            input,
        }
    }

    pub fn system(action: SystemAction) -> Self {
        Self::System {
            request_id: None,
            action,
            lines: None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Hook { request_id, .. } | Self::System { request_id, .. } => request_id.as_deref(),
        }
    }

    /// Parse one request line
    pub fn parse(line: &[u8]) -> Result<Self, Rejected> {
        let reject = |request_id: Option<String>, error| Rejected { request_id, error };

        if line.len() > MAX_REQUEST_BYTES {
            return Err(reject(None, ProtocolError::TooLarge));
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return Err(reject(None, ProtocolError::Empty));
        }
        let envelope: Envelope = serde_json::from_slice(line)
            .map_err(|e| reject(None, ProtocolError::Malformed(e.to_string())))?;

        // Numeric ids are accepted and echoed as strings
        let request_id = envelope.request_id.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        let Some(event) = envelope.event else {
            return Err(reject(request_id, ProtocolError::MissingField("event")));
        };

        if event == SYSTEM_EVENT {
            let Some(action) = envelope.action else {
                return Err(reject(request_id, ProtocolError::MissingField("action")));
            };
            let action = match action.parse() {
                Ok(action) => action,
                Err(e) => return Err(reject(request_id, e)),
            };
            return Ok(Self::System {
                request_id,
                action,
                lines: envelope.lines,
            });
        }

        let category = match event.parse::<EventCategory>() {
            Ok(category) => category,
            Err(e) => return Err(reject(request_id, e.into())),
        };
        let Some(input) = envelope.hook_input else {
            return Err(reject(request_id, ProtocolError::MissingField("hook_input")));
        };
        Ok(Self::Hook {
            request_id,
            category,
            input,
        })
    }

    /// Wire form of the request, without the trailing newline
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Hook {
                request_id,
                category,
                input,
            } => {
                let mut value = json!({
                    "event": category.wire_name(),
                    "hook_input": input,
                });
                if let Some(id) = request_id {
                    value["request_id"] = json!(id);
                }
                value
            }
            Self::System {
                request_id,
                action,
                lines,
            } => {
                let mut value = json!({
                    "event": SYSTEM_EVENT,
                    "action": action.as_str(),
                });
                if let Some(id) = request_id {
                    value["request_id"] = json!(id);
                }
                if let Some(lines) = lines {
                    value["lines"] = json!(lines);
                }
                value
            }
        }
    }
}

/// Encode a JSON value as one protocol line
pub fn encode_line(value: &Value) -> anyhow::Result<Vec<u8>> {
    let mut buf = serde_json::to_vec(value)?;
    buf.push(b'\n');
    Ok(buf)
}
