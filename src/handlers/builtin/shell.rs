//! Shell command handlers

use std::sync::Arc;

use anyhow::Result;
use regex::Regex;
use serde_json::Value;

use crate::dispatch::{Handler, HandlerMeta, Outcome};
use crate::handlers::registry::HandlerContext;
use crate::types::HookEvent;
use crate::util::{first_line, truncate_str};

/// Asks for confirmation before privileged commands
pub struct SudoConfirm {
    meta: HandlerMeta,
    sudo: Regex,
}

impl SudoConfirm {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            meta: ctx.meta,
            sudo: Regex::new(r"(^|[;&|(]\s*)(sudo|doas)\s")?,
        }))
    }
}

impl Handler for SudoConfirm {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        event.is_bash()
            && event
                .command()
                .is_some_and(|cmd| self.sudo.is_match(cmd.trim_start()))
    }

    fn handle(&self, _event: &HookEvent) -> Result<Outcome> {
        Ok(Outcome::ask(
            "This command runs with elevated privileges and needs explicit confirmation.",
        ))
    }
}

/// Explains failed Bash commands after they ran
pub struct BashFailureAdvisor {
    meta: HandlerMeta,
}

impl BashFailureAdvisor {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self { meta: ctx.meta }))
    }
}

fn exit_code(response: &Value) -> Option<i64> {
    response
        .get("exit_code")
        .or_else(|| response.get("exitCode"))
        .and_then(Value::as_i64)
}

impl Handler for BashFailureAdvisor {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        if !event.is_bash() {
            return false;
        }
        let Some(response) = event.tool_response() else {
            return false;
        };
        let interrupted = response
            .get("interrupted")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        interrupted || exit_code(response).is_some_and(|code| code != 0)
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let response = event.tool_response().cloned().unwrap_or(Value::Null);
        let stderr = response
            .get("stderr")
            .and_then(Value::as_str)
            .and_then(first_line)
            .map(|l| truncate_str(l, 160));

        let mut line = match exit_code(&response) {
            Some(code) => format!("The last command failed with exit code {}", code),
            None => "The last command was interrupted".to_string(),
        };
        if let Some(stderr) = stderr {
            line.push_str(&format!(": {}", stderr));
        }
        Ok(Outcome::advise(line)
            .with_guidance("Read the error output and fix the cause before retrying the same command."))
    }
}
