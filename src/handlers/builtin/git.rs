//! Git-related handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tokio::process::Command;

use crate::dispatch::{Handler, HandlerMeta, Outcome};
use crate::handlers::exec::run_with_timeout;
use crate::handlers::registry::HandlerContext;
use crate::types::HookEvent;

/// Commands that discard work with no way back
const DESTRUCTIVE_PATTERNS: &[(&str, &str)] = &[
    (
        r"\bgit\s+reset\s+(?:[^|;&]*\s)?--hard\b",
        "`git reset --hard` discards all uncommitted changes",
    ),
    (
        r"\bgit\s+clean\s+(?:[^|;&]*\s)?-[a-zA-Z]*f",
        "`git clean -f` deletes untracked files",
    ),
    (
        r"\bgit\s+checkout\s+(?:[^|;&]*\s)?--\s+\S",
        "`git checkout -- <path>` overwrites local modifications",
    ),
    (
        r"\bgit\s+restore\s+(?:--worktree\s+)?\.(?:\s|$)",
        "`git restore .` overwrites local modifications",
    ),
    (
        r"\bgit\s+stash\s+(?:drop|clear)\b",
        "`git stash drop/clear` deletes stashed work",
    ),
    (
        r"\bgit\s+push\s+(?:[^|;&]*\s)?(?:--force|-f)(?:\s|$)",
        "`git push --force` overwrites remote history",
    ),
    (
        r"\bgit\s+branch\s+(?:[^|;&]*\s)?-D\b",
        "`git branch -D` deletes an unmerged branch",
    ),
];

/// Blocks git commands that cause irreversible data loss
pub struct DestructiveGit {
    meta: HandlerMeta,
    patterns: Vec<(Regex, String)>,
}

impl DestructiveGit {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        let mut patterns = DESTRUCTIVE_PATTERNS
            .iter()
            .map(|(re, why)| Ok((Regex::new(re)?, why.to_string())))
            .collect::<Result<Vec<_>>>()?;
        for extra in ctx.string_list("extra_patterns", &[])? {
            let re = Regex::new(&extra).with_context(|| format!("invalid pattern '{}'", extra))?;
            patterns.push((re, format!("`{}` matches a blocked pattern", extra)));
        }
        Ok(Arc::new(Self {
            meta: ctx.meta,
            patterns,
        }))
    }

    fn violation(&self, command: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(command))
            .map(|(_, why)| why.as_str())
    }
}

impl Handler for DestructiveGit {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        event.is_bash()
            && event
                .command()
                .is_some_and(|cmd| cmd.contains("git") && self.violation(cmd).is_some())
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let command = event.command().unwrap_or_default();
        let why = self.violation(command).unwrap_or("destructive git command");
        Ok(Outcome::deny(format!(
            "Blocked: {}. This can cause irreversible data loss.",
            why
        ))
        .with_guidance("Commit or stash the work first, or ask the user to run the command themselves."))
    }
}

/// Reminds about pre-commit checks on `git commit`
pub struct GitCommitAdvisor {
    meta: HandlerMeta,
    commit: Regex,
}

impl GitCommitAdvisor {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            meta: ctx.meta,
            commit: Regex::new(r"\bgit\s+commit\b")?,
        }))
    }
}

impl Handler for GitCommitAdvisor {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        event.is_bash() && event.command().is_some_and(|cmd| self.commit.is_match(cmd))
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let command = event.command().unwrap_or_default();
        if command.contains("--no-verify") {
            return Ok(Outcome::advise(
                "Committing with --no-verify skips the project's pre-commit checks.",
            ));
        }
        Ok(Outcome::advise(
            "Before committing, make sure tests and linters pass for the staged changes.",
        ))
    }
}

/// Current branch of the repository containing `dir`
pub fn current_branch(dir: &Path, timeout: Duration) -> Result<String> {
    let output = run_with_timeout(
        Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(dir),
        None,
        timeout,
    )?;
    if !output.success() {
        bail!("git rev-parse failed: {}", output.stderr.trim());
    }
    Ok(output.stdout.trim().to_string())
}

/// Directory an event refers to, falling back to the project root
fn event_dir(event: &HookEvent, root: &Path) -> PathBuf {
    event
        .cwd()
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .unwrap_or_else(|| root.to_path_buf())
}

/// Adds the current branch to each user prompt
pub struct GitBranchContext {
    meta: HandlerMeta,
    root: PathBuf,
    timeout: Duration,
}

impl GitBranchContext {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            timeout: Duration::from_millis(ctx.u64_option("timeout_ms", 2000)?),
            root: ctx.project_root.to_path_buf(),
            meta: ctx.meta,
        }))
    }
}

impl Handler for GitBranchContext {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, _event: &HookEvent) -> bool {
        true
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let branch = current_branch(&event_dir(event, &self.root), self.timeout)?;
        Ok(Outcome::advise(format!("Current git branch: {}", branch)))
    }
}

/// Status line segment showing the current branch
pub struct StatusLineGit {
    meta: HandlerMeta,
    root: PathBuf,
    timeout: Duration,
}

impl StatusLineGit {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            timeout: Duration::from_millis(ctx.u64_option("timeout_ms", 1000)?),
            root: ctx.project_root.to_path_buf(),
            meta: ctx.meta,
        }))
    }
}

impl Handler for StatusLineGit {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, _event: &HookEvent) -> bool {
        true
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        // Outside a repository the segment is simply omitted
        match current_branch(&event_dir(event, &self.root), self.timeout) {
            Ok(branch) => Ok(Outcome::advise(format!("git:{}", branch))),
            Err(_) => Ok(Outcome::pass()),
        }
    }
}
