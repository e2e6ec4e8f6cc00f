//! Built-in handler catalogue

mod audit;
mod files;
mod git;
mod shell;
mod status;
mod workflow;

use crate::types::EventCategory;

use super::registry::CatalogueEntry;

/// Every built-in handler with its default priority and tags
pub fn catalogue() -> Vec<CatalogueEntry> {
    use EventCategory::*;

    let mut entries = vec![
        CatalogueEntry {
            id: "destructive_git",
            category: PreToolUse,
            priority: 10,
            tags: &["safety", "git", "blocking"],
            factory: git::DestructiveGit::build,
        },
        CatalogueEntry {
            id: "sensitive_file_guard",
            category: PreToolUse,
            priority: 20,
            tags: &["safety", "files", "blocking"],
            factory: files::SensitiveFileGuard::build,
        },
        CatalogueEntry {
            id: "sudo_confirm",
            category: PreToolUse,
            priority: 30,
            tags: &["safety", "shell"],
            factory: shell::SudoConfirm::build,
        },
        CatalogueEntry {
            id: "git_commit_advisor",
            category: PreToolUse,
            priority: 50,
            tags: &["git", "advisory"],
            factory: git::GitCommitAdvisor::build,
        },
        CatalogueEntry {
            id: "bash_failure_advisor",
            category: PostToolUse,
            priority: 20,
            tags: &["shell", "advisory"],
            factory: shell::BashFailureAdvisor::build,
        },
        CatalogueEntry {
            id: "auto_approve_reads",
            category: PermissionRequest,
            priority: 10,
            tags: &["workflow"],
            factory: files::AutoApproveReads::build,
        },
        CatalogueEntry {
            id: "workflow_snapshot",
            category: PreCompact,
            priority: 50,
            tags: &["workflow"],
            factory: workflow::WorkflowSnapshot::build,
        },
        CatalogueEntry {
            id: "workflow_restore",
            category: SessionStart,
            priority: 50,
            tags: &["workflow"],
            factory: workflow::WorkflowRestore::build,
        },
        CatalogueEntry {
            id: "git_branch_context",
            category: UserPromptSubmit,
            priority: 50,
            tags: &["git", "advisory"],
            factory: git::GitBranchContext::build,
        },
        CatalogueEntry {
            id: "status_line_model",
            category: StatusLine,
            priority: 10,
            tags: &["status"],
            factory: status::StatusLineModel::build,
        },
        CatalogueEntry {
            id: "status_line_git",
            category: StatusLine,
            priority: 20,
            tags: &["status", "git"],
            factory: git::StatusLineGit::build,
        },
    ];

    for category in [Notification, Stop, SubagentStop, SessionEnd] {
        entries.push(CatalogueEntry {
            id: "audit_log",
            category,
            priority: 90,
            tags: &["audit"],
            factory: audit::AuditLog::build,
        });
    }

    entries
}
