// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! `snooze start|stop|restart` - systemd unit passthrough.
//!
//! The daemon is managed as the `snoozed` service; these subcommands are a
//! convenience wrapper, not part of the socket protocol.

use super::exit_code;

const SERVICE_NAME: &str = "snoozed";

pub fn run_service(action: &str) -> i32 {
    match action {
        "start" | "stop" | "restart" => {}
        other => {
            eprintln!("Unknown service action: {}", other);
            return exit_code::SYNTAX;
        }
    }

    let status = std::process::Command::new("systemctl")
        .arg(action)
        .arg(SERVICE_NAME)
        .status();
    match status {
        Ok(status) if status.success() => exit_code::SUCCESS,
        Ok(status) => {
            eprintln!(
                "systemctl {} {} exited with {}",
                action, SERVICE_NAME, status
            );
            exit_code::GENERAL
        }
        Err(e) => {
            eprintln!("Failed to run systemctl: {}", e);
            exit_code::GENERAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_action_is_syntax_error() {
        assert_eq!(run_service("explode"), exit_code::SYNTAX);
    }
}
