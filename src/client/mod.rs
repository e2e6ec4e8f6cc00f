//! Client Module
//!
//! Client-side IPC with the daemon, including lazy startup. CLI commands and
//! the `hook` forwarder use this module.

pub mod connection;

pub use connection::DaemonClient;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::daemon::paths::RuntimeArtifacts;
use crate::daemon::protocol::{Request, SystemAction};
use crate::types::EventCategory;

/// Errors that can occur when communicating with the daemon
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon is not running (no socket at {})", .0.display())]
    DaemonNotRunning(PathBuf),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Daemon error: {0}")]
    DaemonError(String),
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl DaemonClient {
    /// Run a control action and return its `result`
    pub async fn system(&self, action: SystemAction) -> Result<Value, ClientError> {
        self.system_with(Request::system(action)).await
    }

    /// `logs` with an explicit line count
    pub async fn logs(&self, lines: usize) -> Result<Value, ClientError> {
        self.system_with(Request::System {
            request_id: None,
            action: SystemAction::Logs,
            lines: Some(lines),
        })
        .await
    }

    async fn system_with(&self, request: Request) -> Result<Value, ClientError> {
        let mut response = self.send(&request).await?;
        if let Some(error) = response.get("error").and_then(Value::as_str) {
            return Err(ClientError::DaemonError(error.to_string()));
        }
        Ok(response.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    /// Forward a hook event; the response is returned as-is, including
    /// `{"error"}` responses
    pub async fn hook(&self, category: EventCategory, input: Value) -> Result<Value, ClientError> {
        self.send(&Request::hook(category, input)).await
    }
}

/// How to launch a daemon in the background
#[derive(Debug, Clone)]
pub struct Launcher {
    /// Daemon executable, normally the current one
    pub exe: PathBuf,
    pub project_root: PathBuf,
    pub artifacts: RuntimeArtifacts,
    /// How long to wait for the socket to come up
    pub startup_timeout: Duration,
}

impl Launcher {
    pub fn new(project_root: PathBuf, artifacts: RuntimeArtifacts, startup_timeout: Duration) -> Result<Self> {
        let exe = std::env::current_exe().context("failed to determine current executable path")?;
        Ok(Self {
            exe,
            project_root,
            artifacts,
            startup_timeout,
        })
    }

    pub fn client(&self) -> DaemonClient {
        DaemonClient::new(&self.artifacts.socket_path)
    }

    /// Spawn `<exe> --project-root <root> start --foreground` detached from
    /// the calling session, appending its output to the daemon log
    pub fn spawn(&self) -> Result<u32> {
        self.artifacts
            .ensure_dirs()
            .context("failed to create runtime directories")?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.artifacts.log_path)
            .with_context(|| format!("failed to open log file {}", self.artifacts.log_path.display()))?;
        let log_err = log.try_clone().context("failed to duplicate log file handle")?;

        let mut command = Command::new(&self.exe);
        command
            .arg("--project-root")
            .arg(&self.project_root)
            .arg("start")
            .arg("--foreground")
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and runs in the forked child
            unsafe {
                command.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn daemon {}", self.exe.display()))?;
        info!("Spawned daemon process {}", child.id());
        Ok(child.id())
    }

    /// Connect, starting the daemon when nothing answers
    ///
    /// Returns `true` when a daemon was started by this call.
    pub async fn ensure_daemon_running(&self) -> Result<bool> {
        let client = self.client();
        if client.is_reachable().await {
            debug!("Daemon already reachable");
            return Ok(false);
        }

        let pid = self.spawn()?;
        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        while tokio::time::Instant::now() < deadline {
            if client.is_reachable().await {
                debug!("Daemon {} reachable", pid);
                return Ok(true);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        anyhow::bail!(
            "daemon did not become reachable on socket {} within {:?}; see {}",
            self.artifacts.socket_path.display(),
            self.startup_timeout,
            self.artifacts.log_path.display()
        )
    }
}

/// Wait until no live process holds the PID file
pub async fn wait_for_exit(pid_path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if crate::daemon::lifecycle::get_daemon_pid(pid_path).is_none() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
