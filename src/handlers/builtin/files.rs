//! File access handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;

use crate::dispatch::{Handler, HandlerMeta, Outcome};
use crate::handlers::registry::HandlerContext;
use crate::types::HookEvent;

const WRITE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

const SENSITIVE_PATTERNS: &[&str] = &[
    r"(^|/)\.env(\.[^/]+)?$",
    r"\.(pem|key|p12|pfx)$",
    r"(^|/)id_(rsa|dsa|ecdsa|ed25519)$",
    r"(^|/)\.git/",
    r"(^|/)\.ssh/",
    r"(^|/)(credentials|secrets)(\.[^/]+)?$",
];

/// Env templates are meant to be edited
const ENV_TEMPLATES: &[&str] = &[".env.example", ".env.sample", ".env.template"];

/// Blocks edits to secrets and repository internals
pub struct SensitiveFileGuard {
    meta: HandlerMeta,
    patterns: Vec<Regex>,
}

impl SensitiveFileGuard {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        let mut sources: Vec<String> = SENSITIVE_PATTERNS.iter().map(|s| s.to_string()).collect();
        sources.extend(ctx.string_list("extra_patterns", &[])?);
        let patterns = sources
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid pattern '{}'", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Self {
            meta: ctx.meta,
            patterns,
        }))
    }

    fn is_sensitive(&self, path: &str) -> bool {
        if ENV_TEMPLATES.iter().any(|t| path.ends_with(t)) {
            return false;
        }
        self.patterns.iter().any(|re| re.is_match(path))
    }
}

impl Handler for SensitiveFileGuard {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        event
            .tool_name()
            .is_some_and(|tool| WRITE_TOOLS.contains(&tool))
            && event.file_path().is_some_and(|p| self.is_sensitive(p))
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let path = event.file_path().unwrap_or_default();
        Ok(Outcome::deny(format!(
            "Blocked: {} looks like a secret or repository internal and must not be modified.",
            path
        )))
    }
}

/// Approves permission prompts for read-only tools
pub struct AutoApproveReads {
    meta: HandlerMeta,
    tools: Vec<String>,
}

impl AutoApproveReads {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            tools: ctx.string_list("tools", &["Read", "Glob", "Grep", "LS"])?,
            meta: ctx.meta,
        }))
    }
}

impl Handler for AutoApproveReads {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        event
            .tool_name()
            .is_some_and(|tool| self.tools.iter().any(|t| t == tool))
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let mut outcome = Outcome::allow();
        if let Outcome::Final(v) = &mut outcome {
            v.reason = Some(format!(
                "{} is read-only and approved automatically",
                event.tool_name().unwrap_or("tool")
            ));
        }
        Ok(outcome)
    }
}
