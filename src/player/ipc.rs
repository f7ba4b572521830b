//! mpv JSON IPC: one request per connection over the player's control socket.
//!
//! Requests are single JSON objects terminated by a newline; mpv answers with
//! `{"error": "success"|..., "data": ..., "request_id": N}` and may interleave
//! event lines, which are skipped.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

fn next_request_id() -> i64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("cannot connect to player socket {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("player socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("player did not answer within {0:?}")]
    Timeout(Duration),
    #[error("player reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("player rejected command: {0}")]
    Player(String),
    #[error("player closed the socket before answering")]
    Disconnected,
}

/// A command object written to the control socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MpvCommand {
    pub command: Vec<Value>,
    pub request_id: i64,
}

impl MpvCommand {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            command: args,
            request_id: next_request_id(),
        }
    }

    pub fn cycle(property: &str) -> Self {
        Self::new(vec!["cycle".into(), property.into()])
    }

    /// Relative seek by `seconds` (negative seeks backwards).
    pub fn seek_relative(seconds: i64) -> Self {
        Self::new(vec!["seek".into(), seconds.into(), "relative".into()])
    }

    pub fn set_property(name: &str, value: impl Into<Value>) -> Self {
        Self::new(vec!["set_property".into(), name.into(), value.into()])
    }

    pub fn get_property(name: &str) -> Self {
        Self::new(vec!["get_property".into(), name.into()])
    }
}

/// A reply line. Event lines carry no `request_id` and never parse as this.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
    pub error: String,
    #[serde(default)]
    pub data: Option<Value>,
    pub request_id: i64,
}

impl MpvResponse {
    pub fn is_success(&self) -> bool {
        self.error == "success"
    }
}

/// Send `cmd` to the socket at `socket_path` and wait up to `timeout` for
/// the matching reply. A reply whose `error` is not `success` is an error.
pub async fn request(socket_path: &Path, cmd: &MpvCommand, timeout: Duration) -> Result<MpvResponse, IpcError> {
    match tokio::time::timeout(timeout, exchange(socket_path, cmd)).await {
        Ok(result) => result,
        Err(_) => Err(IpcError::Timeout(timeout)),
    }
}

async fn exchange(socket_path: &Path, cmd: &MpvCommand) -> Result<MpvResponse, IpcError> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|source| IpcError::Connect {
            path: socket_path.display().to_string(),
            source,
        })?;
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_vec(cmd)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() || !trimmed.contains("request_id") {
            continue;
        }
        let response: MpvResponse = match serde_json::from_str(trimmed) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Skipping unparseable player line {}: {}", trimmed, e);
                continue;
            }
        };
        if response.request_id != cmd.request_id {
            continue;
        }
        if !response.is_success() {
            return Err(IpcError::Player(response.error));
        }
        return Ok(response);
    }
    Err(IpcError::Disconnected)
}
