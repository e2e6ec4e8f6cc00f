//! Workflow state carried across context compaction
//!
//! `workflow_snapshot` writes a small JSON file before compaction and
//! `workflow_restore` turns it back into session context on the next start.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::{Handler, HandlerMeta, Outcome};
use crate::handlers::registry::HandlerContext;
use crate::types::HookEvent;

pub const STATE_FILE: &str = "workflow-state.json";

#[derive(Debug, Serialize, Deserialize)]
struct WorkflowState {
    session_id: Option<String>,
    cwd: Option<String>,
    transcript_path: Option<String>,
    trigger: Option<String>,
    custom_instructions: Option<String>,
    saved_at: DateTime<Utc>,
}

pub struct WorkflowSnapshot {
    meta: HandlerMeta,
    path: PathBuf,
}

impl WorkflowSnapshot {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            path: ctx.state_dir.join(STATE_FILE),
            meta: ctx.meta,
        }))
    }
}

impl Handler for WorkflowSnapshot {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, _event: &HookEvent) -> bool {
        true
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let field = |name: &str| {
            event
                .input
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let state = WorkflowState {
            session_id: event.session_id().map(str::to_string),
            cwd: event.cwd().map(str::to_string),
            transcript_path: event.transcript_path().map(str::to_string),
            trigger: field("trigger"),
            custom_instructions: field("custom_instructions").filter(|s| !s.is_empty()),
            saved_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        // Write-then-rename so a concurrent reader never sees a partial file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&state)?)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)?;
        debug!("Saved workflow state to {}", self.path.display());

        Ok(Outcome::advise("Workflow state saved before compaction."))
    }
}

pub struct WorkflowRestore {
    meta: HandlerMeta,
    path: PathBuf,
}

impl WorkflowRestore {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            path: ctx.state_dir.join(STATE_FILE),
            meta: ctx.meta,
        }))
    }
}

impl Handler for WorkflowRestore {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, _event: &HookEvent) -> bool {
        self.path.exists()
    }

    fn handle(&self, _event: &HookEvent) -> Result<Outcome> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            // Another session consumed it first
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Outcome::pass()),
            Err(e) => return Err(e).context("failed to read workflow state"),
        };
        let _ = fs::remove_file(&self.path);
        let state: WorkflowState =
            serde_json::from_str(&content).context("corrupt workflow state")?;

        let mut line = format!(
            "Resuming after context compaction (saved {})",
            state.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(session) = &state.session_id {
            line.push_str(&format!(", previous session {}", session));
        }
        if let Some(cwd) = &state.cwd {
            line.push_str(&format!(", working directory {}", cwd));
        }
        line.push('.');

        let mut outcome = Outcome::advise(line);
        if let (Some(instructions), Outcome::Advisory(advice)) =
            (state.custom_instructions, &mut outcome)
        {
            advice
                .context
                .push(format!("Compaction instructions: {}", instructions));
        }
        Ok(outcome)
    }
}
