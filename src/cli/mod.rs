// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI support for the `snooze` control binary.
//!
//! Every subcommand talks to the daemon through the control socket; the
//! CLI holds no state and renders whatever the daemon reports.

pub mod client;
pub mod config_cmd;
pub mod history_cmd;
pub mod service;
pub mod status;

pub use client::{CliError, SnoozeClient};

/// CLI exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const SYNTAX: i32 = 2;
    pub const CONNECTION: i32 = 3;
    pub const PERMISSION: i32 = 4;
    pub const CONFIG: i32 = 5;
}

/// Map a client error to the documented exit code.
pub fn exit_code_for(error: &CliError) -> i32 {
    match error {
        CliError::ConnectionFailed(_) | CliError::Timeout => exit_code::CONNECTION,
        CliError::Io(_) => exit_code::CONNECTION,
        CliError::Daemon(message) => {
            if message.contains("not authorized") || message.contains("denied") {
                exit_code::PERMISSION
            } else if message.contains("config") || message.contains("key") {
                exit_code::CONFIG
            } else {
                exit_code::GENERAL
            }
        }
        CliError::Protocol(_) => exit_code::GENERAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            exit_code::SUCCESS,
            exit_code::GENERAL,
            exit_code::SYNTAX,
            exit_code::CONNECTION,
            exit_code::PERMISSION,
            exit_code::CONFIG,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_connection_errors_map_to_three() {
        let err = CliError::ConnectionFailed("refused".into());
        assert_eq!(exit_code_for(&err), exit_code::CONNECTION);
        assert_eq!(exit_code_for(&CliError::Timeout), exit_code::CONNECTION);
    }

    #[test]
    fn test_permission_error_maps_to_four() {
        let err = CliError::Daemon("operation not authorized: ec2:StopInstances".into());
        assert_eq!(exit_code_for(&err), exit_code::PERMISSION);
    }

    #[test]
    fn test_config_error_maps_to_five() {
        let err = CliError::Daemon("unknown config key: bogus".into());
        assert_eq!(exit_code_for(&err), exit_code::CONFIG);
    }
}
