//! Hook input schema checks
//!
//! Each category lists the fields it expects and their JSON types. Extra
//! fields are always allowed; the agent CLI adds new ones over time.

use serde_json::Value;

use crate::types::EventCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Object,
    Bool,
    Any,
}

impl Kind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Kind::String => value.is_string(),
            Kind::Object => value.is_object(),
            Kind::Bool => value.is_boolean(),
            Kind::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Object => "object",
            Kind::Bool => "boolean",
            Kind::Any => "any",
        }
    }
}

struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
}

const fn req(name: &'static str, kind: Kind) -> Field {
    Field {
        name,
        kind,
        required: true,
    }
}

const fn opt(name: &'static str, kind: Kind) -> Field {
    Field {
        name,
        kind,
        required: false,
    }
}

/// Fields every event may carry
const COMMON: &[Field] = &[
    opt("session_id", Kind::String),
    opt("transcript_path", Kind::String),
    opt("cwd", Kind::String),
    opt("hook_event_name", Kind::String),
    opt("permission_mode", Kind::String),
];

const TOOL_USE: &[Field] = &[req("tool_name", Kind::String), req("tool_input", Kind::Object)];
const POST_TOOL_USE: &[Field] = &[
    req("tool_name", Kind::String),
    req("tool_input", Kind::Object),
    opt("tool_response", Kind::Any),
];
const PERMISSION_REQUEST: &[Field] = &[req("tool_name", Kind::String), opt("tool_input", Kind::Object)];
const USER_PROMPT_SUBMIT: &[Field] = &[req("prompt", Kind::String)];
const NOTIFICATION: &[Field] = &[req("message", Kind::String)];
const SESSION_START: &[Field] = &[opt("source", Kind::String)];
const SESSION_END: &[Field] = &[opt("reason", Kind::String)];
const PRE_COMPACT: &[Field] = &[
    opt("trigger", Kind::String),
    opt("custom_instructions", Kind::String),
];
const STOP: &[Field] = &[opt("stop_hook_active", Kind::Bool)];
const STATUS_LINE: &[Field] = &[opt("model", Kind::Any), opt("workspace", Kind::Object)];

fn schema(category: EventCategory) -> &'static [Field] {
    use EventCategory::*;
    match category {
        PreToolUse => TOOL_USE,
        PostToolUse => POST_TOOL_USE,
        PermissionRequest => PERMISSION_REQUEST,
        UserPromptSubmit => USER_PROMPT_SUBMIT,
        Notification => NOTIFICATION,
        SessionStart => SESSION_START,
        SessionEnd => SESSION_END,
        PreCompact => PRE_COMPACT,
        Stop | SubagentStop => STOP,
        StatusLine => STATUS_LINE,
    }
}

/// Problems with a hook input; empty when it conforms
pub fn validate_input(category: EventCategory, input: &Value) -> Vec<String> {
    let Some(object) = input.as_object() else {
        return vec!["hook_input must be a JSON object".to_string()];
    };

    let mut problems = Vec::new();
    for field in COMMON.iter().chain(schema(category)) {
        match object.get(field.name) {
            None | Some(Value::Null) if field.required => {
                problems.push(format!("missing required field '{}'", field.name));
            }
            Some(value) if !value.is_null() && !field.kind.accepts(value) => {
                problems.push(format!("field '{}' must be of type {}", field.name, field.kind.name()));
            }
            _ => {}
        }
    }

    if let Some(name) = object.get("hook_event_name").and_then(Value::as_str) {
        if name != category.wire_name() {
            problems.push(format!(
                "hook_event_name '{}' does not match event '{}'",
                name,
                category.wire_name()
            ));
        }
    }

    problems
}
