//! IPC Server
//!
//! Unix domain socket server. Each connection carries one newline-terminated
//! JSON request and receives one newline-terminated JSON response.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::controller::DaemonController;
use super::protocol::{encode_line, ProtocolError, MAX_REQUEST_BYTES};
use super::response;

/// Time a client gets to send its request line
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Time in-flight connections get to finish once shutdown starts
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// IPC server listening on a Unix domain socket
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
    controller: Arc<DaemonController>,
}

impl IpcServer {
    /// Bind the socket, clearing a stale file left by a dead daemon
    ///
    /// Fails if another process still accepts connections on the path.
    pub fn bind(socket_path: &Path, controller: Arc<DaemonController>) -> Result<Self> {
        if socket_path.exists() {
            if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
                bail!("socket {} is in use by another process", socket_path.display());
            }
            debug!("Removing stale socket {}", socket_path.display());
            std::fs::remove_file(socket_path).context("Failed to remove stale socket file")?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket {}", socket_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!("IPC server listening on: {}", socket_path.display());
        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
            controller,
        })
    }

    /// Accept connections until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let controller = self.controller.clone();
                            connections.spawn(async move {
                                if let Err(e) = handle_connection(stream, controller).await {
                                    warn!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => {
                    info!("IPC server shutting down");
                    break;
                }
            }
        }

        drop(self.listener);
        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Abandoning connections still open after shutdown");
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Read a request line, dispatch it and write the response
async fn handle_connection(stream: UnixStream, controller: Arc<DaemonController>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).take(MAX_REQUEST_BYTES as u64 + 2);
    let mut line = Vec::new();

    let read = tokio::time::timeout(READ_TIMEOUT, reader.read_until(b'\n', &mut line)).await;
    let response = match read {
        Err(_) => {
            debug!("Client sent nothing within {:?}", READ_TIMEOUT);
            return Ok(());
        }
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(0)) => {
            debug!("Client disconnected before sending a request");
            return Ok(());
        }
        Ok(Ok(_)) => {
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.len() > MAX_REQUEST_BYTES {
                warn!("Rejected oversized request");
                controller.stats().record_rejected();
                response::error(ProtocolError::TooLarge.to_string(), None)
            } else {
                controller.handle_line(&line).await
            }
        }
    };

    write_half.write_all(&encode_line(&response)?).await?;
    write_half.flush().await?;
    write_half.shutdown().await?;
    Ok(())
}
