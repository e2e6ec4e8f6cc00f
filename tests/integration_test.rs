//! Integration tests for hooks-daemon
//!
//! Each test runs a daemon in-process against a temporary project and talks
//! to it over its Unix socket.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

use hooks_daemon::client::DaemonClient;
use hooks_daemon::config::{Config, InstancePolicySetting, ValidationMode};
use hooks_daemon::daemon::response::ResponseShape;
use hooks_daemon::daemon::{Daemon, DaemonOptions, RuntimeArtifacts, SystemAction};
use hooks_daemon::dispatch::{Handler, HandlerMeta, Outcome};
use hooks_daemon::handlers::{CatalogueEntry, HandlerContext, HandlerRegistry};
use hooks_daemon::types::{EventCategory, HookEvent};

/// Temporary project with a `.claude` marker directory
fn project() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn config(idle_timeout_secs: u64) -> Config {
    let mut config = Config::default();
    config.daemon.single_instance = InstancePolicySetting::Conservative;
    config.daemon.idle_timeout_secs = idle_timeout_secs;
    config
}

struct Running {
    artifacts: RuntimeArtifacts,
    client: DaemonClient,
    handle: JoinHandle<Result<()>>,
}

async fn start(root: PathBuf, config: Config, registry: HandlerRegistry) -> Running {
    let options = DaemonOptions {
        registry,
        ..Default::default()
    };
    let daemon = Daemon::start(root, config, options).await.unwrap();
    let artifacts = daemon.artifacts().clone();
    let client = DaemonClient::new(&artifacts.socket_path).with_timeout(Duration::from_secs(10));
    let handle = tokio::spawn(daemon.run());
    Running {
        artifacts,
        client,
        handle,
    }
}

impl Running {
    async fn stop(self) {
        self.client.system(SystemAction::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("daemon did not stop")
            .unwrap()
            .unwrap();
        assert!(!self.artifacts.pid_path.exists());
        assert!(!self.artifacts.socket_path.exists());
    }
}

fn bash(command: &str) -> Value {
    json!({"tool_name": "Bash", "tool_input": {"command": command}})
}

static RECORDER_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Low-priority PreToolUse handler counting how often it runs
struct Recorder {
    meta: HandlerMeta,
}

impl Recorder {
    fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self { meta: ctx.meta }))
    }
}

impl Handler for Recorder {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, _event: &HookEvent) -> bool {
        true
    }

    fn handle(&self, _event: &HookEvent) -> Result<Outcome> {
        RECORDER_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::pass())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_destructive_git_is_denied_before_later_handlers() {
    let (_dir, root) = project();
    let mut registry = HandlerRegistry::builtin();
    registry.register(CatalogueEntry {
        id: "recorder",
        category: EventCategory::PreToolUse,
        priority: 99,
        tags: &["test"],
        factory: Recorder::build,
    });
    let daemon = start(root, config(0), registry).await;

    let denied = daemon
        .client
        .hook(EventCategory::PreToolUse, bash("git reset --hard HEAD~1"))
        .await
        .unwrap();
    let output = &denied["hookSpecificOutput"];
    assert_eq!(output["hookEventName"], "PreToolUse");
    assert_eq!(output["permissionDecision"], "deny");
    assert!(output["permissionDecisionReason"]
        .as_str()
        .unwrap()
        .contains("irreversible"));
    assert_eq!(RECORDER_CALLS.load(Ordering::SeqCst), 0);

    let allowed = daemon
        .client
        .hook(EventCategory::PreToolUse, bash("ls -la"))
        .await
        .unwrap();
    let output = &allowed["hookSpecificOutput"];
    assert_eq!(output["permissionDecision"], "allow");
    assert!(output.get("additionalContext").is_none());
    assert!(output.get("permissionDecisionReason").is_none());
    assert_eq!(RECORDER_CALLS.load(Ordering::SeqCst), 1);

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_request_keeps_serving() {
    let (_dir, root) = project();
    let daemon = start(root, config(0), HandlerRegistry::builtin()).await;

    let stream = UnixStream::connect(&daemon.artifacts.socket_path).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(b"{not json\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(read_half).read_line(&mut line).await.unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert!(response["error"].as_str().unwrap().contains("malformed JSON"));

    let unknown = daemon
        .client
        .send(&hooks_daemon::daemon::Request::hook(EventCategory::Stop, json!({})))
        .await
        .unwrap();
    assert_eq!(unknown["decision"], "allow");

    assert_eq!(daemon.client.system(SystemAction::Ping).await.unwrap(), "pong");
    let status = daemon.client.system(SystemAction::Status).await.unwrap();
    assert_eq!(status["stats"]["errors_total"], 1);

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_reports_one_stable_instance() {
    let (_dir, root) = project();
    let daemon = start(root.clone(), config(0), HandlerRegistry::builtin()).await;

    let first = daemon.client.system(SystemAction::Status).await.unwrap();
    let second = daemon.client.system(SystemAction::Status).await.unwrap();
    assert_eq!(first["pid"], second["pid"]);
    assert_eq!(first["pid"], std::process::id());
    assert_eq!(first["socket_path"], second["socket_path"]);
    assert_eq!(first["project_root"], json!(root));
    assert_eq!(
        std::fs::read_to_string(&daemon.artifacts.pid_path).unwrap().trim(),
        std::process::id().to_string()
    );

    let health = daemon.client.system(SystemAction::Health).await.unwrap();
    assert_eq!(health["healthy"], true);

    let handlers = daemon.client.system(SystemAction::Handlers).await.unwrap();
    let ids: Vec<&str> = handlers["PreToolUse"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec!["destructive_git", "sensitive_file_guard", "sudo_confirm", "git_commit_advisor"]
    );

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_timeout_shuts_down_and_restarts() {
    let (_dir, root) = project();
    let daemon = start(root.clone(), config(1), HandlerRegistry::builtin()).await;
    assert_eq!(daemon.client.system(SystemAction::Ping).await.unwrap(), "pong");

    tokio::time::timeout(Duration::from_secs(10), daemon.handle)
        .await
        .expect("idle daemon did not exit")
        .unwrap()
        .unwrap();
    assert!(!daemon.artifacts.pid_path.exists());
    assert!(!daemon.artifacts.socket_path.exists());
    assert!(!daemon.client.is_reachable().await);

    let restarted = start(root, config(0), HandlerRegistry::builtin()).await;
    assert_eq!(restarted.artifacts.socket_path, daemon.artifacts.socket_path);
    assert_eq!(restarted.client.system(SystemAction::Ping).await.unwrap(), "pong");
    restarted.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_workflow_state_survives_compaction() {
    let (_dir, root) = project();
    let daemon = start(root, config(0), HandlerRegistry::builtin()).await;

    let compact = daemon
        .client
        .hook(
            EventCategory::PreCompact,
            json!({
                "session_id": "s-1",
                "cwd": "/work",
                "trigger": "manual",
                "custom_instructions": "keep the failing test list"
            }),
        )
        .await
        .unwrap();
    assert_eq!(compact["hookSpecificOutput"]["hookEventName"], "PreCompact");

    let resumed = daemon
        .client
        .hook(EventCategory::SessionStart, json!({"session_id": "s-2", "source": "compact"}))
        .await
        .unwrap();
    let context = resumed["hookSpecificOutput"]["additionalContext"].as_str().unwrap();
    assert!(context.contains("previous session s-1"));
    assert!(context.contains("Compaction instructions: keep the failing test list"));

    // The snapshot is consumed once
    let again = daemon
        .client
        .hook(EventCategory::SessionStart, json!({"session_id": "s-3"}))
        .await
        .unwrap();
    assert!(again["hookSpecificOutput"].get("additionalContext").is_none());

    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_line_and_permission_shapes() {
    let (_dir, root) = project();
    let daemon = start(root, config(0), HandlerRegistry::builtin()).await;

    let line = daemon
        .client
        .hook(EventCategory::StatusLine, json!({"model": {"display_name": "Opus"}}))
        .await
        .unwrap();
    assert!(line["text"].as_str().unwrap().starts_with("Opus"));

    let read = daemon
        .client
        .hook(
            EventCategory::PermissionRequest,
            json!({"tool_name": "Read", "tool_input": {"file_path": "src/lib.rs"}}),
        )
        .await
        .unwrap();
    assert_eq!(read["hookSpecificOutput"]["permissionDecision"], "allow");

    let sudo = daemon
        .client
        .hook(EventCategory::PreToolUse, bash("sudo apt-get install jq"))
        .await
        .unwrap();
    assert_eq!(sudo["hookSpecificOutput"]["permissionDecision"], "ask");

    daemon.stop().await;
}

/// Smallest input each category's schema accepts
fn minimal_input(category: EventCategory) -> Value {
    use EventCategory::*;
    let mut input = json!({"session_id": "s-min", "cwd": "/nonexistent/work"});
    let extra = match category {
        PreToolUse | PostToolUse => bash("echo hi"),
        PermissionRequest => json!({"tool_name": "Read"}),
        UserPromptSubmit => json!({"prompt": "hello"}),
        Notification => json!({"message": "waiting for input"}),
        SessionStart | SessionEnd | PreCompact | Stop | SubagentStop | StatusLine => json!({}),
    };
    for (key, value) in extra.as_object().unwrap() {
        input[key] = value.clone();
    }
    input
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_category_dispatches_without_error() {
    let (_dir, root) = project();
    let mut config = config(0);
    config.daemon.input_validation = ValidationMode::Strict;
    let daemon = start(root, config, HandlerRegistry::builtin()).await;

    for category in EventCategory::ALL {
        let response = daemon
            .client
            .hook(category, minimal_input(category))
            .await
            .unwrap_or_else(|e| panic!("{:?} failed: {}", category, e));
        assert!(response.get("error").is_none(), "{:?}: {}", category, response);

        match ResponseShape::of(category) {
            ResponseShape::Permission => {
                let output = &response["hookSpecificOutput"];
                assert_eq!(output["hookEventName"], category.wire_name());
                assert!(
                    matches!(output["permissionDecision"].as_str(), Some("allow" | "deny" | "ask")),
                    "{:?}: {}",
                    category,
                    response
                );
            }
            ResponseShape::DecisionReason => {
                assert!(
                    matches!(response["decision"].as_str(), Some("allow" | "deny")),
                    "{:?}: {}",
                    category,
                    response
                );
            }
            ResponseShape::ContextOnly => {
                assert_eq!(response["hookSpecificOutput"]["hookEventName"], category.wire_name());
            }
            ResponseShape::PlainText => assert!(response["text"].is_string()),
        }
    }

    let status = daemon.client.system(SystemAction::Status).await.unwrap();
    assert_eq!(status["stats"]["errors_total"], 0);

    daemon.stop().await;
}
