//! Request dispatch for control-socket connections.
//!
//! Internal errors surface to clients as `{"error": <message>}`; stack
//! traces and provider details stay in the logs.

use std::sync::Arc;

use crate::config::SharedConfig;
use crate::daemon::StatusCell;
use crate::history::HistoryStore;
use crate::shutdown::ShutdownCoordinator;
use crate::types::Verdict;

use super::protocol::{decode_request, encode_response, Command, Response};

pub struct RequestHandler {
    config: SharedConfig,
    status: StatusCell,
    history: Arc<HistoryStore>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl RequestHandler {
    pub fn new(
        config: SharedConfig,
        status: StatusCell,
        history: Arc<HistoryStore>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            config,
            status,
            history,
            shutdown,
        }
    }

    /// Process one request line into one response line (no newline).
    pub fn handle_line(&self, line: &str) -> String {
        encode_response(&self.dispatch(line))
    }

    fn dispatch(&self, line: &str) -> Response {
        let Some(_guard) = self.shutdown.track() else {
            return Response::Error("server is shutting down".to_string());
        };

        let request = match decode_request(line.trim()) {
            Ok(request) => request,
            Err(e) => return Response::Error(e.to_string()),
        };
        let command = match request.parse_command() {
            Ok(command) => command,
            Err(e) => return Response::Error(e.to_string()),
        };

        match command {
            Command::Status => self.handle_status(),
            Command::ConfigGet => self.handle_config_get(),
            Command::ConfigSet { name, value } => self.handle_config_set(&name, &value),
            Command::History { limit, since } => self.handle_history(limit, since),
        }
    }

    fn handle_status(&self) -> Response {
        // One read lock, one snapshot: a response never mixes ticks.
        let status = self.status.read().clone();
        Response::Data(serde_json::json!({
            "metrics": status.metrics,
            "idle_since": status.idle_since,
            "should_snooze": status.verdict == Verdict::ShouldSnooze,
            "snooze_reason": status.reason,
            "paused": status.paused,
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }

    fn handle_config_get(&self) -> Response {
        match serde_json::to_value(self.config.snapshot()) {
            Ok(value) => Response::Data(value),
            Err(e) => Response::Error(format!("config serialization failed: {}", e)),
        }
    }

    fn handle_config_set(&self, name: &str, value: &serde_json::Value) -> Response {
        if let Err(e) = self.config.update_key(name, value) {
            return Response::Error(e.to_string());
        }
        let current = serde_json::to_value(self.config.snapshot())
            .ok()
            .and_then(|v| v.get(name).cloned())
            .unwrap_or(serde_json::Value::Null);
        Response::Data(serde_json::json!({ "name": name, "value": current }))
    }

    fn handle_history(&self, limit: usize, since: Option<u64>) -> Response {
        let events = self.history.query(limit, since);
        match serde_json::to_value(events) {
            Ok(value) => Response::Data(value),
            Err(e) => Response::Error(format!("history serialization failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;

    use crate::config::Config;
    use crate::daemon::DaemonStatus;
    use crate::types::{SnoozeEvent, SystemMetrics};

    fn handler_fixture() -> (RequestHandler, StatusCell, Arc<HistoryStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedConfig::new(Config::default(), dir.path().join("snooze.json"));
        let status: StatusCell = Arc::new(RwLock::new(DaemonStatus::default()));
        let history = Arc::new(HistoryStore::new());
        let handler = RequestHandler::new(
            config,
            Arc::clone(&status),
            Arc::clone(&history),
            Arc::new(ShutdownCoordinator::new()),
        );
        (handler, status, history, dir)
    }

    fn parse(raw: &str) -> serde_json::Value {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_status_empty_daemon() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line(r#"{"command": "STATUS"}"#));
        let data = &response["data"];
        assert_eq!(data["should_snooze"], false);
        assert_eq!(data["metrics"], serde_json::Value::Null);
        assert_eq!(data["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_status_reflects_published_tick() {
        let (handler, status, _history, _dir) = handler_fixture();
        *status.write() = DaemonStatus {
            metrics: Some(SystemMetrics {
                cpu_usage_pct: 2.0,
                collection_time: 500,
                ..Default::default()
            }),
            idle_since: Some(400),
            verdict: Verdict::ShouldSnooze,
            reason: "idle for 100s below thresholds".into(),
            paused: false,
        };

        let response = parse(&handler.handle_line(r#"{"command": "STATUS"}"#));
        let data = &response["data"];
        assert_eq!(data["should_snooze"], true);
        assert_eq!(data["idle_since"], 400);
        assert_eq!(data["snooze_reason"], "idle for 100s below thresholds");
        assert_eq!(data["metrics"]["collection_time"], 500);
    }

    #[test]
    fn test_config_get_returns_full_config() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line(r#"{"command": "CONFIG_GET"}"#));
        assert_eq!(response["data"]["naptime_minutes"], 30);
        assert_eq!(response["data"]["tagging_prefix"], "CloudSnooze");
    }

    #[test]
    fn test_config_set_roundtrip() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line(
            r#"{"command": "CONFIG_SET", "params": {"name": "cpu_threshold_percent", "value": "50"}}"#,
        ));
        assert_eq!(response["data"]["value"], 50.0);

        let config = parse(&handler.handle_line(r#"{"command": "CONFIG_GET"}"#));
        assert_eq!(config["data"]["cpu_threshold_percent"], 50.0);
        // Other keys untouched.
        assert_eq!(config["data"]["memory_threshold_percent"], 30.0);
    }

    #[test]
    fn test_config_set_invalid_key_is_error() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line(
            r#"{"command": "CONFIG_SET", "params": {"name": "bogus", "value": 1}}"#,
        ));
        assert!(response["error"].as_str().unwrap().contains("bogus"));
        assert!(response.get("data").is_none());
    }

    #[test]
    fn test_config_set_bad_value_is_error() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line(
            r#"{"command": "CONFIG_SET", "params": {"name": "cpu_threshold_percent", "value": "lots"}}"#,
        ));
        assert!(response["error"].as_str().is_some());
    }

    #[test]
    fn test_history_empty() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line(r#"{"command": "HISTORY", "params": {"limit": 10}}"#));
        assert_eq!(response["data"], serde_json::json!([]));
    }

    #[test]
    fn test_history_returns_recorded_events() {
        let (handler, _status, history, _dir) = handler_fixture();
        history.record(SnoozeEvent {
            timestamp: 1000,
            reason: "idle for 1800s below thresholds".into(),
            metrics_snapshot: SystemMetrics::default(),
            instance_id: "i-0abc".into(),
        });

        let response = parse(&handler.handle_line(r#"{"command": "HISTORY"}"#));
        let events = response["data"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["timestamp"], 1000);
        assert_eq!(events[0]["instance_id"], "i-0abc");
    }

    #[test]
    fn test_malformed_request_is_error_response() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line("garbage"));
        assert!(response["error"].as_str().is_some());
    }

    #[test]
    fn test_unknown_command_is_error_response() {
        let (handler, _status, _history, _dir) = handler_fixture();
        let response = parse(&handler.handle_line(r#"{"command": "NOPE"}"#));
        assert!(response["error"].as_str().unwrap().contains("NOPE"));
    }

    #[tokio::test]
    async fn test_shutting_down_rejects_requests() {
        let (handler, _status, _history, _dir) = handler_fixture();
        handler
            .shutdown
            .initiate(std::time::Duration::from_millis(5))
            .await;
        let response = parse(&handler.handle_line(r#"{"command": "STATUS"}"#));
        assert!(response["error"].as_str().unwrap().contains("shutting down"));
    }
}
