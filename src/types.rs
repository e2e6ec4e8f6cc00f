//! Core types for hook events

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Category of a hook event emitted by the agent CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    PreToolUse,
    PostToolUse,
    SessionStart,
    SessionEnd,
    PreCompact,
    Stop,
    SubagentStop,
    UserPromptSubmit,
    Notification,
    PermissionRequest,
    StatusLine,
}

/// Returned when an event name does not map to any category
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown event category: {0}")]
pub struct UnknownCategory(pub String);

impl EventCategory {
    /// Every category, in a stable order
    pub const ALL: [EventCategory; 11] = [
        EventCategory::PreToolUse,
        EventCategory::PostToolUse,
        EventCategory::SessionStart,
        EventCategory::SessionEnd,
        EventCategory::PreCompact,
        EventCategory::Stop,
        EventCategory::SubagentStop,
        EventCategory::UserPromptSubmit,
        EventCategory::Notification,
        EventCategory::PermissionRequest,
        EventCategory::StatusLine,
    ];

    /// Name used on the wire (`hookEventName`)
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::SessionStart => "SessionStart",
            Self::SessionEnd => "SessionEnd",
            Self::PreCompact => "PreCompact",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Notification => "Notification",
            Self::PermissionRequest => "PermissionRequest",
            Self::StatusLine => "StatusLine",
        }
    }

    /// Name used as a key in the config file
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::PreCompact => "pre_compact",
            Self::Stop => "stop",
            Self::SubagentStop => "subagent_stop",
            Self::UserPromptSubmit => "user_prompt_submit",
            Self::Notification => "notification",
            Self::PermissionRequest => "permission_request",
            Self::StatusLine => "status_line",
        }
    }

    /// Position in [`EventCategory::ALL`], used for counter arrays
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|c| c == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for EventCategory {
    type Err = UnknownCategory;

    /// Accepts `PreToolUse`, `pre_tool_use` and `pre-tool-use`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        Self::ALL
            .iter()
            .copied()
            .find(|c| c.wire_name().to_lowercase() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// A single hook event received from the agent CLI
///
/// The payload is kept as raw JSON because its shape depends on the category
/// and drifts across CLI versions. Typed accessors cover the fields handlers
/// actually read.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    pub category: EventCategory,
    pub input: Value,
}

impl HookEvent {
    pub fn new(category: EventCategory, input: Value) -> Self {
        Self { category, input }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(Value::as_str)
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.str_field("tool_name")
    }

    pub fn tool_input(&self) -> Option<&Value> {
        self.input.get("tool_input")
    }

    pub fn tool_response(&self) -> Option<&Value> {
        self.input.get("tool_response")
    }

    /// Shell command of a Bash tool call
    pub fn command(&self) -> Option<&str> {
        self.tool_input()
            .and_then(|t| t.get("command"))
            .and_then(Value::as_str)
    }

    /// Target path of a file tool call (Write, Edit, Read, ...)
    pub fn file_path(&self) -> Option<&str> {
        self.tool_input().and_then(|t| {
            t.get("file_path")
                .or_else(|| t.get("path"))
                .or_else(|| t.get("notebook_path"))
                .and_then(Value::as_str)
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.str_field("session_id")
    }

    pub fn transcript_path(&self) -> Option<&str> {
        self.str_field("transcript_path")
    }

    pub fn cwd(&self) -> Option<&str> {
        self.str_field("cwd")
    }

    pub fn prompt(&self) -> Option<&str> {
        self.str_field("prompt")
    }

    pub fn message(&self) -> Option<&str> {
        self.str_field("message")
    }

    /// True when the event is a Bash tool call
    pub fn is_bash(&self) -> bool {
        self.tool_name() == Some("Bash")
    }
}
