//! Daemon Lifecycle Management
//!
//! Handles daemon startup, idle shutdown and single-instance guarantees.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::handlers::HandlerRegistry;
use crate::logging::LogBuffer;

use super::controller::{DaemonController, InstanceInfo};
use super::environment::{choose_policy, policy_setting, InstancePolicy, IsolationIndicators};
use super::paths::{check_nested_install, ArtifactOverrides, ProjectLayout, RuntimeArtifacts};
use super::process::{current_exe_name, find_daemon_processes, process_alive, terminate_processes};
use super::server::IpcServer;

/// How long aggressive enforcement waits for SIGTERM before SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How long the server gets to stop before it is aborted
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Startup failures that need a specific diagnostic
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no project root found from {0}: pass --project-root or create a .claude directory")]
    NoProjectRoot(PathBuf),

    #[error("refusing to start: nested installation at {}: {reason}", .root.display())]
    NestedInstall { root: PathBuf, reason: String },

    #[error("daemon is already running (PID {pid}); stop it first or remove {}", .pid_path.display())]
    AlreadyRunning { pid: u32, pid_path: PathBuf },
}

/// Inputs to [`Daemon::start`] besides the project and config
#[derive(Default)]
pub struct DaemonOptions {
    pub overrides: ArtifactOverrides,
    pub registry: HandlerRegistry,
    pub logs: Option<LogBuffer>,
}

/// Daemon instance owning the socket and PID file
pub struct Daemon {
    controller: Arc<DaemonController>,
    server: IpcServer,
    shutdown_tx: broadcast::Sender<()>,
    artifacts: RuntimeArtifacts,
    idle_timeout: Option<Duration>,
}

impl Daemon {
    /// Start the daemon for `project_root`
    pub async fn start(project_root: PathBuf, config: Config, options: DaemonOptions) -> Result<Self> {
        info!("Starting hooks daemon for {}", project_root.display());
        check_nested_install(&project_root)?;

        let layout = ProjectLayout::new(project_root);
        let router = options
            .registry
            .build_router(&config, &layout)
            .context("Failed to build handler chains")?;

        let artifacts = RuntimeArtifacts::resolve(&layout, &config.daemon, &options.overrides);
        artifacts
            .ensure_dirs()
            .context("Failed to create runtime directories")?;
        std::fs::create_dir_all(layout.state_dir()).context("Failed to create state directory")?;

        let indicators = IsolationIndicators::detect();
        let weights = &config.daemon.isolation_weights;
        let isolation_score = indicators.score(weights);
        let policy = choose_policy(
            policy_setting(&config.daemon),
            &indicators,
            weights,
            config.daemon.isolation_threshold,
        );
        info!(
            "Single-instance policy: {:?} (isolation score {:.2})",
            policy, isolation_score
        );

        if policy == InstancePolicy::Aggressive {
            enforce_aggressive().await;
        }
        acquire_lock(&artifacts.pid_path)?;

        let (shutdown_tx, _) = broadcast::channel(16);
        let idle_timeout = match config.daemon.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let controller = Arc::new(DaemonController::new(
            router,
            config,
            layout,
            artifacts.clone(),
            InstanceInfo {
                policy,
                isolation_score,
                indicators,
            },
            options.logs,
            shutdown_tx.clone(),
        ));

        let server = match IpcServer::bind(&artifacts.socket_path, controller.clone()) {
            Ok(server) => server,
            Err(e) => {
                release_lock(&artifacts);
                return Err(e);
            }
        };

        info!("Socket path: {}", artifacts.socket_path.display());
        info!("PID file: {}", artifacts.pid_path.display());
        Ok(Self {
            controller,
            server,
            shutdown_tx,
            artifacts,
            idle_timeout,
        })
    }

    pub fn controller(&self) -> Arc<DaemonController> {
        self.controller.clone()
    }

    pub fn artifacts(&self) -> &RuntimeArtifacts {
        &self.artifacts
    }

    /// Sender that stops the daemon when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Serve until a signal, a `shutdown` request or the idle timeout
    pub async fn run(self) -> Result<()> {
        info!("Daemon running");
        let Self {
            controller,
            server,
            shutdown_tx,
            artifacts,
            idle_timeout,
        } = self;

        let shutdown_rx = shutdown_tx.subscribe();
        let server_handle = tokio::spawn({
            let shutdown_rx = shutdown_tx.subscribe();
            async move {
                match server.run(shutdown_rx).await {
                    Ok(()) => info!("IPC server shut down cleanly"),
                    Err(e) => error!("IPC server failed: {}", e),
                }
            }
        });

        if let Some(timeout) = idle_timeout {
            tokio::spawn(watch_idle(controller.clone(), timeout, shutdown_tx.clone()));
        }

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = wait_for_sigterm() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = wait_for_shutdown(shutdown_rx) => {
                info!("Shutdown signalled");
            }
        }

        let _ = shutdown_tx.send(());

        let server_abort = server_handle.abort_handle();
        if tokio::time::timeout(SERVER_STOP_TIMEOUT, server_handle).await.is_err() {
            warn!("IPC server did not shut down within {:?}, aborting", SERVER_STOP_TIMEOUT);
            server_abort.abort();
        }

        release_lock(&artifacts);
        let stats = controller.stats().snapshot();
        info!(
            "Daemon shutdown complete ({} requests, uptime {}s)",
            stats.requests_total, stats.uptime_seconds
        );
        Ok(())
    }
}

/// Terminate every other daemon with our signature
async fn enforce_aggressive() {
    let Some(exe_name) = current_exe_name() else {
        warn!("Cannot determine executable name; skipping process scan");
        return;
    };
    let pids = find_daemon_processes(&exe_name);
    if pids.is_empty() {
        debug!("No other {} daemons found", exe_name);
        return;
    }
    let report = terminate_processes(&pids, TERMINATE_GRACE).await;
    info!(
        "Terminated {} daemon process(es), killed {}",
        report.terminated.len(),
        report.killed.len()
    );
}

/// Shut down once nothing has completed for `timeout` and nothing is running
async fn watch_idle(controller: Arc<DaemonController>, timeout: Duration, shutdown_tx: broadcast::Sender<()>) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let period = (timeout / 4).clamp(Duration::from_millis(50), Duration::from_secs(5));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if controller.in_flight() == 0 && controller.idle_for() >= timeout {
                    info!("Idle for {:?}, shutting down", timeout);
                    let _ = shutdown_tx.send(());
                    break;
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// Acquire single-instance lock via PID file
///
/// Uses `create_new(true)` for atomic creation. A PID file naming a dead
/// process (or this one) is stale and replaced once.
pub fn acquire_lock(pid_path: &Path) -> Result<()> {
    match create_pid_file(pid_path) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e).context("Failed to create PID file"),
    }

    if let Some(pid) = read_pid(pid_path) {
        if pid != std::process::id() && process_alive(pid) {
            return Err(LifecycleError::AlreadyRunning {
                pid,
                pid_path: pid_path.to_path_buf(),
            }
            .into());
        }
        debug!("Removing stale PID file for {}", pid);
    }

    std::fs::remove_file(pid_path).context("Failed to remove stale PID file")?;
    create_pid_file(pid_path).context("Failed to create PID file after removing stale lock")
}

fn create_pid_file(pid_path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(pid_path)?;
    writeln!(file, "{}", std::process::id())
}

/// Remove the PID file and socket, but only while the PID file is ours
fn release_lock(artifacts: &RuntimeArtifacts) {
    if read_pid(&artifacts.pid_path) != Some(std::process::id()) {
        warn!(
            "PID file {} no longer belongs to this process; leaving artifacts in place",
            artifacts.pid_path.display()
        );
        return;
    }
    for path in [&artifacts.socket_path, &artifacts.pid_path] {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// PID recorded in a PID file
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// PID of the running daemon, if any
pub fn get_daemon_pid(pid_path: &Path) -> Option<u32> {
    read_pid(pid_path).filter(|&pid| process_alive(pid))
}

pub fn is_daemon_running(pid_path: &Path) -> bool {
    get_daemon_pid(pid_path).is_some()
}

/// What `repair` found and removed
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub running_pid: Option<u32>,
    pub removed: Vec<PathBuf>,
}

/// Remove a stale PID file and socket left by a dead daemon
pub fn repair(artifacts: &RuntimeArtifacts) -> Result<RepairReport> {
    let mut report = RepairReport {
        running_pid: get_daemon_pid(&artifacts.pid_path),
        ..Default::default()
    };
    if report.running_pid.is_some() {
        return Ok(report);
    }
    for path in [&artifacts.pid_path, &artifacts.socket_path] {
        if path.exists() {
            std::fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
            report.removed.push(path.clone());
        }
    }
    Ok(report)
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}. Falling back to pending future.", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}
