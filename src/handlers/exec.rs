//! Bounded subprocess execution for handlers
//!
//! Handlers run on the blocking pool, so commands are driven to completion
//! with `block_on` on the daemon's runtime. Each child gets its own process
//! group; on the deadline the whole group is killed, which also covers
//! grandchildren still holding the output pipes.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};

/// Captured output of a finished command
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run a command, feeding `stdin` and killing it once `timeout` elapses
///
/// Must be called from a blocking context, never from an async task.
pub fn run_with_timeout(
    command: &mut Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput> {
    match Handle::try_current() {
        Ok(handle) => handle.block_on(run(command, stdin, timeout)),
        Err(_) => Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build runtime for subprocess")?
            .block_on(run(command, stdin, timeout)),
    }
}

async fn run(command: &mut Command, stdin: Option<&[u8]>, timeout: Duration) -> Result<CommandOutput> {
    let program = format!("{:?}", command.as_std().get_program());
    let mut child = command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {}", program))?;
    let pgid = child.id();

    let pipe = child.stdin.take();
    let input = stdin.unwrap_or_default();
    let writer = async move {
        if let Some(mut pipe) = pipe {
            // The child may exit without reading; a broken pipe is fine
            let _ = pipe.write_all(input).await;
        }
    };

    let finished = tokio::time::timeout(timeout, async {
        let (_, output) = tokio::join!(writer, child.wait_with_output());
        output
    })
    .await;

    match finished {
        Ok(output) => {
            let output = output.with_context(|| format!("failed to wait for {}", program))?;
            Ok(CommandOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        Err(_) => {
            if let Some(pgid) = pgid {
                kill_group(pgid);
            }
            Err(anyhow!("{} timed out after {}ms", program, timeout.as_millis()))
        }
    }
}

fn kill_group(pgid: u32) {
    let Ok(pgid) = i32::try_from(pgid) else {
        return;
    };
    // SAFETY: kill has no memory-safety preconditions
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_captures_stdout_and_stdin() {
        let out = run_with_timeout(
            Command::new("cat").arg("-"),
            Some(b"hello"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let out = run_with_timeout(
            Command::new("sh").args(["-c", "echo oops >&2; exit 3"]),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn test_timeout_kills_child() {
        let start = Instant::now();
        let err = run_with_timeout(
            Command::new("sleep").arg("10"),
            None,
            Duration::from_millis(100),
        )
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_background_grandchild_holding_pipes_is_bounded() {
        let start = Instant::now();
        let err = run_with_timeout(
            Command::new("sh").args(["-c", "sleep 4 & echo '{}'"]),
            None,
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_on_blocking_pool_of_daemon_runtime() {
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(|| {
            run_with_timeout(
                Command::new("sh").args(["-c", "sleep 4 & echo '{}'"]),
                None,
                Duration::from_millis(300),
            )
        })
        .await
        .unwrap();
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(2));

        let out = tokio::task::spawn_blocking(|| {
            run_with_timeout(Command::new("echo").arg("ok"), None, Duration::from_secs(5))
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out.stdout.trim(), "ok");
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let err = run_with_timeout(
            &mut Command::new("/nonexistent/hooks-daemon-test-binary"),
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
