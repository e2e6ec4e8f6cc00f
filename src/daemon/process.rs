//! Process inspection for single-instance enforcement

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Whether a process exists and is not a zombie
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // SAFETY: signal 0 only checks for existence and permission
    let exists = unsafe { libc::kill(pid as i32, 0) } == 0
        || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    exists && !is_zombie(pid)
}

fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // State follows the parenthesised command name, which may contain spaces
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state == 'Z' || state == 'X')
}

/// Arguments of a running process
pub fn read_process_cmdline(pid: u32) -> Option<Vec<String>> {
    let raw = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    let args = raw
        .split(|byte| *byte == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).to_string())
        .collect::<Vec<_>>();
    if args.is_empty() { None } else { Some(args) }
}

/// File name of the running executable
pub fn current_exe_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    exe.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Whether an argument list looks like a foreground daemon of `exe_name`
pub fn is_daemon_signature(args: &[String], exe_name: &str) -> bool {
    let Some(program) = args.first() else {
        return false;
    };
    let program_name = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    program_name == exe_name
        && args.iter().any(|a| a == "start")
        && args.iter().any(|a| a == "--foreground")
}

/// Every other live daemon process with our signature
pub fn find_daemon_processes(exe_name: &str) -> Vec<u32> {
    let own = std::process::id();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    let mut pids: Vec<u32> = entries
        .filter_map(|e| e.ok()?.file_name().to_str()?.parse::<u32>().ok())
        .filter(|&pid| pid != own)
        .filter(|&pid| {
            read_process_cmdline(pid).is_some_and(|args| is_daemon_signature(&args, exe_name))
        })
        .filter(|&pid| process_alive(pid))
        .collect();
    pids.sort_unstable();
    pids
}

fn send_signal(pid: u32, signal: libc::c_int) -> bool {
    // SAFETY: plain kill(2) on a pid we just observed
    unsafe { libc::kill(pid as i32, signal) == 0 }
}

/// Result of terminating a set of processes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminationReport {
    /// Exited after SIGTERM
    pub terminated: Vec<u32>,
    /// Needed SIGKILL
    pub killed: Vec<u32>,
}

/// SIGTERM every pid, wait up to `grace`, then SIGKILL the survivors
pub async fn terminate_processes(pids: &[u32], grace: Duration) -> TerminationReport {
    let mut report = TerminationReport::default();
    if pids.is_empty() {
        return report;
    }

    for &pid in pids {
        info!("Terminating daemon process {}", pid);
        if !send_signal(pid, libc::SIGTERM) {
            debug!("SIGTERM to {} failed: {}", pid, std::io::Error::last_os_error());
        }
    }

    let deadline = tokio::time::Instant::now() + grace;
    let mut remaining: Vec<u32> = pids.to_vec();
    while !remaining.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
        remaining.retain(|&pid| {
            let alive = process_alive(pid);
            if !alive {
                report.terminated.push(pid);
            }
            alive
        });
    }

    for pid in remaining {
        warn!("Process {} ignored SIGTERM, sending SIGKILL", pid);
        send_signal(pid, libc::SIGKILL);
        report.killed.push(pid);
    }
    // Give the kernel a moment to tear down killed processes
    if !report.killed.is_empty() {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while report.killed.iter().any(|&pid| process_alive(pid))
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
    report
}
