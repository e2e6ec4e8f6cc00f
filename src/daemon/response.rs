//! Response serialization
//!
//! The agent CLI expects a different JSON shape per event category. This
//! is the only module aware of those differences.

use serde_json::{json, Map, Value};

use crate::dispatch::{Decision, DispatchResult};
use crate::types::EventCategory;

/// Wire shape family of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `hookSpecificOutput.permissionDecision`
    Permission,
    /// Top-level `decision` + `reason`
    DecisionReason,
    /// `hookSpecificOutput.additionalContext` only
    ContextOnly,
    /// `{"text": ...}`
    PlainText,
}

impl ResponseShape {
    pub fn of(category: EventCategory) -> Self {
        use EventCategory::*;
        match category {
            PreToolUse | PermissionRequest => Self::Permission,
            PostToolUse | Stop | SubagentStop => Self::DecisionReason,
            SessionStart | SessionEnd | PreCompact | UserPromptSubmit | Notification => {
                Self::ContextOnly
            }
            StatusLine => Self::PlainText,
        }
    }
}

/// Context lines with guidance appended last
fn context_lines(result: &DispatchResult) -> Vec<String> {
    let mut lines = result.context.clone();
    if let Some(guidance) = &result.guidance {
        lines.push(guidance.clone());
    }
    lines
}

fn hook_specific(category: EventCategory) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("hookEventName".into(), json!(category.wire_name()));
    map
}

/// Serialize a dispatch result for the given category
pub fn render(category: EventCategory, result: &DispatchResult) -> Value {
    match ResponseShape::of(category) {
        ResponseShape::Permission => {
            let mut output = hook_specific(category);
            output.insert("permissionDecision".into(), json!(result.decision.as_str()));
            if let Some(reason) = &result.reason {
                output.insert("permissionDecisionReason".into(), json!(reason));
            }
            let lines = context_lines(result);
            if !lines.is_empty() {
                output.insert("additionalContext".into(), json!(lines.join("\n")));
            }
            json!({ "hookSpecificOutput": output })
        }
        ResponseShape::DecisionReason => {
            // Ask has no meaning after the fact; fail open
            let decision = match result.decision {
                Decision::Deny => "deny",
                Decision::Allow | Decision::Ask => "allow",
            };
            let mut response = json!({ "decision": decision });
            if let Some(reason) = &result.reason {
                response["reason"] = json!(reason);
            }
            let lines = context_lines(result);
            if !lines.is_empty() {
                let mut output = hook_specific(category);
                output.insert("additionalContext".into(), json!(lines.join("\n")));
                response["hookSpecificOutput"] = Value::Object(output);
            }
            response
        }
        ResponseShape::ContextOnly => {
            let mut lines = result.context.clone();
            if result.decision == Decision::Deny {
                if let Some(reason) = &result.reason {
                    lines.push(reason.clone());
                }
            }
            if let Some(guidance) = &result.guidance {
                lines.push(guidance.clone());
            }
            let mut output = hook_specific(category);
            if !lines.is_empty() {
                output.insert("additionalContext".into(), json!(lines.join("\n")));
            }
            json!({ "hookSpecificOutput": output })
        }
        ResponseShape::PlainText => json!({ "text": context_lines(result).join(" | ") }),
    }
}

/// Error response, echoing the request id when one was supplied
pub fn error(message: impl Into<String>, request_id: Option<&str>) -> Value {
    let mut response = json!({ "error": message.into() });
    if let Some(id) = request_id {
        response["request_id"] = json!(id);
    }
    response
}

/// Successful control-plane response
pub fn system(result: Value, request_id: Option<&str>) -> Value {
    let mut response = json!({ "status": "ok", "result": result });
    if let Some(id) = request_id {
        response["request_id"] = json!(id);
    }
    response
}
