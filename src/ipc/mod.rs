//! Control-socket module.
//!
//! Line-oriented JSON over a local Unix stream socket: one request per
//! connection, one response back. This is the daemon's entire external
//! surface; the CLI is just another client.

pub mod handler;
pub mod protocol;
pub mod server;

pub use handler::RequestHandler;
pub use protocol::{Command, ProtocolError, Request, Response, MAX_LINE_BYTES};
pub use server::{run_server, ServerError};

/// Default control socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/snoozed.sock";

/// Socket path from the environment or the default.
pub fn get_socket_path() -> String {
    std::env::var("SNOOZE_SOCKET_PATH").unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_path() {
        assert_eq!(DEFAULT_SOCKET_PATH, "/var/run/snoozed.sock");
    }

    #[test]
    fn test_get_socket_path_env_override() {
        std::env::set_var("SNOOZE_SOCKET_PATH", "/tmp/test-snoozed.sock");
        assert_eq!(get_socket_path(), "/tmp/test-snoozed.sock");
        std::env::remove_var("SNOOZE_SOCKET_PATH");
        assert_eq!(get_socket_path(), DEFAULT_SOCKET_PATH);
    }
}
