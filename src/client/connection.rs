//! Client Connection
//!
//! One request per connection: write a JSON line, read a JSON line back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use crate::daemon::protocol::{encode_line, Request};

use super::ClientError;

/// Default time a request may take end to end
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(35);

/// Client for a daemon socket
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn connect(&self) -> Result<UnixStream, ClientError> {
        debug!("Connecting to daemon at: {}", self.socket_path.display());
        UnixStream::connect(&self.socket_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound
                || e.kind() == std::io::ErrorKind::ConnectionRefused
            {
                ClientError::DaemonNotRunning(self.socket_path.clone())
            } else {
                ClientError::ConnectionFailed(e.to_string())
            }
        })
    }

    /// Whether something accepts connections on the socket
    pub async fn is_reachable(&self) -> bool {
        self.connect().await.is_ok()
    }

    /// Send a request and return the raw response object
    pub async fn send(&self, request: &Request) -> Result<Value, ClientError> {
        let line = encode_line(&request.to_wire())
            .map_err(|e| ClientError::RequestFailed(format!("Failed to encode request: {}", e)))?;
        match tokio::time::timeout(self.timeout, self.exchange(&line)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self, line: &[u8]) -> Result<Value, ClientError> {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(line)
            .await
            .map_err(|e| ClientError::RequestFailed(format!("Failed to send request: {}", e)))?;
        write_half
            .flush()
            .await
            .map_err(|e| ClientError::RequestFailed(format!("Failed to flush: {}", e)))?;

        let mut reader = BufReader::new(read_half);
        let mut response = Vec::new();
        let read = reader
            .read_until(b'\n', &mut response)
            .await
            .map_err(|e| ClientError::RequestFailed(format!("Failed to read response: {}", e)))?;
        if read == 0 {
            return Err(ClientError::RequestFailed("daemon closed the connection".to_string()));
        }

        serde_json::from_slice(&response)
            .map_err(|e| ClientError::RequestFailed(format!("Failed to decode response: {}", e)))
    }
}
