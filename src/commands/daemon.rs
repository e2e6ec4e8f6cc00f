use std::time::Duration;

use anyhow::Result;
use hooks_daemon::client::{self, ClientError};
use hooks_daemon::daemon::lifecycle::{self, Daemon, DaemonOptions};
use hooks_daemon::daemon::paths::ArtifactOverrides;
use hooks_daemon::daemon::process::terminate_processes;
use hooks_daemon::daemon::protocol::SystemAction;
use hooks_daemon::logging::LogBuffer;
use serde_json::Value;
use tracing::{info, warn};

use super::{print_json, ProjectContext};

/// How long `stop` waits for the daemon to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the daemon in this process until it shuts down
pub async fn start_foreground(ctx: ProjectContext, logs: Option<LogBuffer>) -> Result<()> {
    if let Some(pid) = lifecycle::get_daemon_pid(&ctx.artifacts.pid_path) {
        if ctx.client().is_reachable().await {
            println!("Daemon is already running (PID {})", pid);
            return Ok(());
        }
    }

    let options = DaemonOptions {
        overrides: ArtifactOverrides::from_env(),
        logs,
        ..Default::default()
    };
    let daemon = Daemon::start(ctx.root().to_path_buf(), ctx.config, options).await?;
    daemon.run().await
}

/// Start a background daemon unless one is already answering
pub async fn start_background(ctx: &ProjectContext) -> Result<()> {
    let started = ctx.launcher()?.ensure_daemon_running().await?;
    let pid = lifecycle::get_daemon_pid(&ctx.artifacts.pid_path);
    match (started, pid) {
        (true, Some(pid)) => println!("Daemon started (PID {})", pid),
        (true, None) => println!("Daemon started"),
        (false, Some(pid)) => println!("Daemon is already running (PID {})", pid),
        (false, None) => println!("Daemon is already running"),
    }
    Ok(())
}

pub async fn stop(ctx: &ProjectContext) -> Result<()> {
    match ctx.client().system(SystemAction::Shutdown).await {
        Ok(_) => info!("Shutdown requested"),
        Err(ClientError::DaemonNotRunning(_)) => match lifecycle::get_daemon_pid(&ctx.artifacts.pid_path) {
            Some(pid) => {
                warn!("Socket is gone but PID {} is alive; sending SIGTERM", pid);
                terminate_processes(&[pid], STOP_TIMEOUT).await;
            }
            None => {
                println!("Daemon is not running");
                return Ok(());
            }
        },
        Err(e) => anyhow::bail!("Failed to stop daemon: {}", e),
    }

    if client::wait_for_exit(&ctx.artifacts.pid_path, STOP_TIMEOUT).await {
        println!("Daemon stopped");
        Ok(())
    } else {
        anyhow::bail!("Daemon did not exit within {:?}", STOP_TIMEOUT)
    }
}

pub async fn restart(ctx: &ProjectContext) -> Result<()> {
    stop(ctx).await?;
    start_background(ctx).await
}

pub async fn status(ctx: &ProjectContext) -> Result<()> {
    let client = ctx.connect().await?;
    let status = client.system(SystemAction::Status).await?;
    let stats = &status["stats"];

    println!("Daemon Status:");
    println!("  PID: {}", status["pid"]);
    println!("  Version: {}", status["version"].as_str().unwrap_or("unknown"));
    println!("  Project: {}", status["project_root"].as_str().unwrap_or(""));
    println!("  Socket: {}", status["socket_path"].as_str().unwrap_or(""));
    println!("  Policy: {}", status["instance"]["policy"].as_str().unwrap_or(""));
    println!("  Handlers: {}", status["handlers_loaded"]);
    println!("  Uptime: {}s", stats["uptime_seconds"]);
    println!("  Requests: {} ({} errors)", stats["requests_total"], stats["errors_total"]);
    if let Some(avg) = stats["avg_processing_ms"].as_f64() {
        println!("  Avg latency: {:.2}ms", avg);
    }
    if let Some(bytes) = stats["memory_usage_bytes"].as_u64() {
        println!("  Memory: {} MB", bytes / (1024 * 1024));
    }
    Ok(())
}

pub async fn health(ctx: &ProjectContext) -> Result<()> {
    let client = ctx.connect().await?;
    let health = client.system(SystemAction::Health).await?;
    print_json(&health)?;
    if health["healthy"] != Value::Bool(true) {
        anyhow::bail!("Daemon is unhealthy");
    }
    Ok(())
}

pub async fn logs(ctx: &ProjectContext, lines: usize) -> Result<()> {
    let client = ctx.connect().await?;
    let result = client.logs(lines).await?;
    for line in result["lines"].as_array().into_iter().flatten() {
        if let Some(line) = line.as_str() {
            println!("{}", line);
        }
    }
    Ok(())
}

pub async fn handlers(ctx: &ProjectContext) -> Result<()> {
    let client = ctx.connect().await?;
    let listing = client.system(SystemAction::Handlers).await?;
    let Some(categories) = listing.as_object() else {
        return print_json(&listing);
    };
    for (category, handlers) in categories {
        println!("{}:", category);
        for handler in handlers.as_array().into_iter().flatten() {
            println!(
                "  {:>4}  {}  [{}]",
                handler["priority"],
                handler["id"].as_str().unwrap_or("?"),
                handler["source"]["type"].as_str().unwrap_or("builtin"),
            );
        }
    }
    Ok(())
}

pub fn repair(ctx: &ProjectContext) -> Result<()> {
    let report = lifecycle::repair(&ctx.artifacts)?;
    if let Some(pid) = report.running_pid {
        println!("Daemon is running (PID {}); nothing to repair", pid);
        return Ok(());
    }
    if report.removed.is_empty() {
        println!("No stale artifacts found");
    }
    for path in &report.removed {
        println!("Removed {}", path.display());
    }
    Ok(())
}
