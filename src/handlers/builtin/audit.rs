//! Append-only audit trail of session events

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;

use crate::dispatch::{Handler, HandlerMeta, Outcome};
use crate::handlers::registry::HandlerContext;
use crate::types::HookEvent;
use crate::util::truncate_str;

pub const AUDIT_FILE: &str = "audit.jsonl";

/// Records one JSON line per event; never affects the decision
pub struct AuditLog {
    meta: HandlerMeta,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            path: ctx.state_dir.join(AUDIT_FILE),
            meta: ctx.meta,
            write_lock: Mutex::new(()),
        }))
    }
}

impl Handler for AuditLog {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, _event: &HookEvent) -> bool {
        true
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let summary = event
            .message()
            .or_else(|| event.tool_name())
            .or_else(|| event.input.get("reason").and_then(|v| v.as_str()))
            .map(|s| truncate_str(s, 200));
        let record = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event.category.wire_name(),
            "session_id": event.session_id(),
            "summary": summary,
        });
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // One write per line on an O_APPEND handle
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(&line)?;
        Ok(Outcome::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventCategory;
    use std::collections::BTreeMap;
    use std::path::Path;

    #[test]
    fn test_appends_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let options = BTreeMap::new();
        let handler = AuditLog::build(HandlerContext {
            meta: HandlerMeta::new("audit_log", EventCategory::Notification, 90),
            options: &options,
            project_root: Path::new("/tmp"),
            state_dir: tmp.path().to_path_buf(),
        })
        .unwrap();

        let event = HookEvent::new(
            EventCategory::Notification,
            json!({"session_id": "s1", "message": "Claude needs your permission"}),
        );
        assert_eq!(handler.handle(&event).unwrap(), Outcome::pass());
        handler.handle(&event).unwrap();

        let content = fs::read_to_string(tmp.path().join(AUDIT_FILE)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "Notification");
        assert_eq!(first["session_id"], "s1");
        assert_eq!(first["summary"], "Claude needs your permission");
    }
}
