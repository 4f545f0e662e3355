//! Control-socket server loop.
//!
//! Unix stream socket, one task per connection, one request per
//! connection. Shutdown arrives over a `watch` channel; in-flight clients
//! are drained by the shutdown coordinator with a bounded grace period.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;

use super::handler::RequestHandler;
use super::protocol::MAX_LINE_BYTES;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the control-socket server until `shutdown_rx` flips.
#[cfg(unix)]
pub async fn run_server(
    socket_path: String,
    handler: Arc<RequestHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    use tokio::net::UnixListener;

    // A previous run may have left a stale socket file behind.
    let _ = std::fs::remove_file(&socket_path);
    if let Some(parent) = std::path::Path::new(&socket_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!(path = %socket_path, "control socket listening");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            handle_connection(stream, handler).await;
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::info!("control socket shutting down");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

/// Serve one connection: read one line, dispatch, write one line.
/// Errors are per-client; they never affect the accept loop.
async fn handle_connection<S>(stream: S, handler: Arc<RequestHandler>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half).take(MAX_LINE_BYTES as u64 + 1);

    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => return, // client connected and went away
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "client read failed");
            return;
        }
    }

    let mut response = handler.handle_line(&line);
    response.push('\n');
    if let Err(e) = write_half.write_all(response.as_bytes()).await {
        tracing::warn!(error = %e, "client write failed");
    }
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixStream;

    use crate::config::{Config, SharedConfig};
    use crate::daemon::DaemonStatus;
    use crate::history::HistoryStore;
    use crate::shutdown::ShutdownCoordinator;

    fn test_handler(dir: &tempfile::TempDir) -> Arc<RequestHandler> {
        Arc::new(RequestHandler::new(
            SharedConfig::new(Config::default(), dir.path().join("snooze.json")),
            Arc::new(RwLock::new(DaemonStatus::default())),
            Arc::new(HistoryStore::new()),
            Arc::new(ShutdownCoordinator::new()),
        ))
    }

    async fn roundtrip(socket_path: &str, request: &str) -> serde_json::Value {
        let mut stream = UnixStream::connect(socket_path).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        serde_json::from_str(raw.trim()).unwrap()
    }

    #[tokio::test]
    async fn test_one_request_per_connection() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock").to_string_lossy().to_string();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = tokio::spawn(run_server(
            socket_path.clone(),
            test_handler(&dir),
            shutdown_rx,
        ));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let response = roundtrip(&socket_path, r#"{"command": "STATUS"}"#).await;
        assert_eq!(response["data"]["should_snooze"], false);

        let response = roundtrip(&socket_path, r#"{"command": "CONFIG_GET"}"#).await;
        assert_eq!(response["data"]["naptime_minutes"], 30);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
        assert!(!std::path::Path::new(&socket_path).exists());
    }

    #[tokio::test]
    async fn test_bad_request_gets_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock").to_string_lossy().to_string();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = tokio::spawn(run_server(
            socket_path.clone(),
            test_handler(&dir),
            shutdown_rx,
        ));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let response = roundtrip(&socket_path, "{ not json").await;
        assert!(response["error"].as_str().is_some());

        // The accept loop survives a bad client.
        let response = roundtrip(&socket_path, r#"{"command": "STATUS"}"#).await;
        assert!(response.get("data").is_some());

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock").to_string_lossy().to_string();
        std::fs::write(&socket_path, b"stale").unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(run_server(
            socket_path.clone(),
            test_handler(&dir),
            shutdown_rx,
        ));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let response = roundtrip(&socket_path, r#"{"command": "STATUS"}"#).await;
        assert!(response.get("data").is_some());

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
