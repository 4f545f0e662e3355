// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Control-socket client for CLI commands.
//!
//! One connection per request: write one JSON line, read one JSON line.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::ipc::protocol::{Request, Response};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The daemon returned `{"error": ...}`.
    #[error("{0}")]
    Daemon(String),
}

pub struct SnoozeClient {
    socket_path: String,
    timeout_duration: Duration,
}

impl SnoozeClient {
    pub fn new(socket_path: String) -> Self {
        Self {
            socket_path,
            timeout_duration: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Issue one request and return the `data` payload.
    pub async fn request(&self, request: &Request) -> Result<serde_json::Value, CliError> {
        let line = serde_json::to_string(request)
            .map_err(|e| CliError::Protocol(e.to_string()))?;
        let raw = self.exchange(&line).await?;

        let response: Response =
            serde_json::from_str(raw.trim()).map_err(|e| CliError::Protocol(e.to_string()))?;
        match response {
            Response::Data(value) => Ok(value),
            Response::Error(message) => Err(CliError::Daemon(message)),
        }
    }

    pub async fn status(&self) -> Result<serde_json::Value, CliError> {
        self.request(&Request::new("STATUS", None)).await
    }

    pub async fn config_get(&self) -> Result<serde_json::Value, CliError> {
        self.request(&Request::new("CONFIG_GET", None)).await
    }

    pub async fn config_set(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, CliError> {
        self.request(&Request::new(
            "CONFIG_SET",
            Some(serde_json::json!({ "name": name, "value": value })),
        ))
        .await
    }

    pub async fn history(&self, limit: usize) -> Result<serde_json::Value, CliError> {
        self.request(&Request::new(
            "HISTORY",
            Some(serde_json::json!({ "limit": limit })),
        ))
        .await
    }

    #[cfg(unix)]
    async fn exchange(&self, line: &str) -> Result<String, CliError> {
        use tokio::net::UnixStream;

        let connect = UnixStream::connect(&self.socket_path);
        let stream = timeout(self.timeout_duration, connect)
            .await
            .map_err(|_| CliError::Timeout)?
            .map_err(|e| CliError::ConnectionFailed(e.to_string()))?;

        let (read_half, mut write_half) = tokio::io::split(stream);
        write_half.write_all(line.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half);
        let mut response = String::new();
        timeout(self.timeout_duration, reader.read_line(&mut response))
            .await
            .map_err(|_| CliError::Timeout)??;

        if response.is_empty() {
            return Err(CliError::Protocol("empty response".to_string()));
        }
        Ok(response)
    }
}
