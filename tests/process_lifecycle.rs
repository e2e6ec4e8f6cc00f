//! Process-level lifecycle tests against the built binary
//!
//! These spawn real background daemons, so they run one at a time.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use hooks_daemon::config::DaemonConfig;
use hooks_daemon::daemon::environment::hostname;
use hooks_daemon::daemon::lifecycle::read_pid;
use hooks_daemon::daemon::paths::{ArtifactOverrides, ProjectLayout, RuntimeArtifacts};
use hooks_daemon::daemon::process::{find_daemon_processes, process_alive};
use serde_json::{json, Value};
use tempfile::TempDir;

static SERIAL: Mutex<()> = Mutex::new(());

const EXE: &str = env!("CARGO_BIN_EXE_hooks-daemon");

fn project() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".claude")).unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

/// PID file the spawned binary resolves: no explicit overrides, so the
/// name is namespaced by this machine's hostname
fn pid_path(root: &Path) -> PathBuf {
    let overrides = ArtifactOverrides {
        hostname: hostname(),
        ..Default::default()
    };
    RuntimeArtifacts::resolve(&ProjectLayout::new(root.to_path_buf()), &DaemonConfig::default(), &overrides).pid_path
}

fn command(root: &Path, policy: &str) -> Command {
    let mut command = Command::new(EXE);
    command
        .arg("--project-root")
        .arg(root)
        .current_dir(root)
        .env("HOOKS_DAEMON_SINGLE_INSTANCE", policy)
        .env_remove("HOOKS_DAEMON_SOCKET_PATH")
        .env_remove("HOOKS_DAEMON_PID_PATH")
        .env_remove("HOOKS_DAEMON_LOG_PATH")
        .env_remove("HOOKS_DAEMON_ENV")
        .env_remove("HOOKS_DAEMON_PROJECT_ROOT");
    command
}

fn run(root: &Path, policy: &str, args: &[&str]) -> Output {
    command(root, policy).args(args).output().unwrap()
}

fn run_hook(root: &Path, event: &str, input: &Value) -> Output {
    let mut child = command(root, "conservative")
        .args(["hook", event])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.to_string().as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

/// Stops the project's daemon even when an assertion fails
struct StopOnDrop(PathBuf);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        let _ = run(&self.0, "conservative", &["stop"]);
    }
}

#[test]
fn test_hook_starts_daemon_lazily() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let (_dir, root) = project();
    let _guard = StopOnDrop(root.clone());
    assert!(read_pid(&pid_path(&root)).is_none());

    let output = run_hook(
        &root,
        "PreToolUse",
        &json!({"tool_name": "Bash", "tool_input": {"command": "git push --force origin main"}}),
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let response: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["hookSpecificOutput"]["permissionDecision"], "deny");

    let pid = read_pid(&pid_path(&root)).expect("daemon wrote no PID file");
    assert!(process_alive(pid));

    // A second invocation reuses the same daemon
    let output = run_hook(
        &root,
        "PreToolUse",
        &json!({"tool_name": "Bash", "tool_input": {"command": "cargo test"}}),
    );
    let response: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["hookSpecificOutput"]["permissionDecision"], "allow");
    assert_eq!(read_pid(&pid_path(&root)), Some(pid));

    let status = run(&root, "conservative", &["status"]);
    assert!(status.status.success());
    assert!(String::from_utf8_lossy(&status.stdout).contains(&format!("PID: {}", pid)));

    let stop = run(&root, "conservative", &["stop"]);
    assert!(stop.status.success());
    assert!(wait_until(Duration::from_secs(5), || !process_alive(pid)));
    assert!(!pid_path(&root).exists());
}

#[test]
fn test_conservative_start_is_idempotent() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let (_dir, root) = project();
    let _guard = StopOnDrop(root.clone());

    assert!(run(&root, "conservative", &["start"]).status.success());
    let pid = read_pid(&pid_path(&root)).unwrap();

    let again = run(&root, "conservative", &["start"]);
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("already running"));
    assert_eq!(read_pid(&pid_path(&root)), Some(pid));

    // A foreground start against a live daemon reports it and leaves it alone
    let foreground = run(&root, "conservative", &["start", "--foreground"]);
    assert!(foreground.status.success());
    assert!(process_alive(pid));
}

#[test]
fn test_aggressive_mode_replaces_other_daemons() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let (_first_dir, first_root) = project();
    let (_second_dir, second_root) = project();
    let _first_guard = StopOnDrop(first_root.clone());
    let _second_guard = StopOnDrop(second_root.clone());

    assert!(run(&first_root, "conservative", &["start"]).status.success());
    let first_pid = read_pid(&pid_path(&first_root)).unwrap();
    assert!(process_alive(first_pid));

    let started = run(&second_root, "aggressive", &["start"]);
    assert!(started.status.success(), "stderr: {}", String::from_utf8_lossy(&started.stderr));
    let second_pid = read_pid(&pid_path(&second_root)).unwrap();

    assert!(wait_until(Duration::from_secs(5), || !process_alive(first_pid)));
    assert!(process_alive(second_pid));
    assert_eq!(find_daemon_processes("hooks-daemon"), vec![second_pid]);

    assert!(run(&second_root, "conservative", &["stop"]).status.success());
    assert!(wait_until(Duration::from_secs(5), || !process_alive(second_pid)));
}
