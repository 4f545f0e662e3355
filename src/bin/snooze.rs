// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! snooze - control CLI for the CloudSnooze daemon.
//!
//! Talks to `snoozed` over the control socket. Exit codes: 0 success,
//! 1 general error, 2 syntax, 3 connection, 4 permission, 5 config.

use std::process::ExitCode;

use cloudsnooze::cli::{config_cmd, exit_code, history_cmd, service, status};
use cloudsnooze::ipc::get_socket_path;

#[tokio::main]
async fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let socket_path = extract_socket_flag(&mut args).unwrap_or_else(get_socket_path);

    let command = args.first().cloned().unwrap_or_else(|| "help".to_string());
    let rest = if args.is_empty() { &[][..] } else { &args[1..] };

    let code = match command.as_str() {
        "status" => {
            let json = rest.iter().any(|a| a == "--json");
            status::run_status(&socket_path, json).await
        }
        "config" => config_cmd::run_config(&socket_path, rest).await,
        "history" => {
            let json = rest.iter().any(|a| a == "--json");
            match parse_limit(rest) {
                Ok(limit) => history_cmd::run_history(&socket_path, limit, json).await,
                Err(message) => {
                    eprintln!("{}", message);
                    exit_code::SYNTAX
                }
            }
        }
        "debug" => status::run_debug(&socket_path).await,
        "start" | "stop" | "restart" => service::run_service(&command),
        "version" | "--version" | "-V" => {
            println!("snooze {}", env!("CARGO_PKG_VERSION"));
            exit_code::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            exit_code::SUCCESS
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            exit_code::SYNTAX
        }
    };

    ExitCode::from(code as u8)
}

/// Pull a `--socket PATH` flag out of the argument list, wherever it sits.
fn extract_socket_flag(args: &mut Vec<String>) -> Option<String> {
    let index = args.iter().position(|a| a == "--socket")?;
    if index + 1 >= args.len() {
        return None;
    }
    let path = args.remove(index + 1);
    args.remove(index);
    Some(path)
}

fn parse_limit(args: &[String]) -> Result<usize, String> {
    let Some(index) = args.iter().position(|a| a == "--limit") else {
        return Ok(50);
    };
    let value = args
        .get(index + 1)
        .ok_or_else(|| "missing value for --limit".to_string())?;
    value
        .parse()
        .map_err(|_| format!("invalid --limit value: {}", value))
}

fn print_usage() {
    eprintln!(
        "snooze - CloudSnooze control CLI v{}

USAGE:
    snooze [--socket PATH] <COMMAND> [OPTIONS]

COMMANDS:
    status [--json]                Show daemon state and current metrics
    config list                    Show all configuration keys
    config get <name>              Show one configuration key
    config set <name> <value>      Update one configuration key
    config reset                   Restore default configuration
    config export [file]           Dump configuration as JSON
    config import <file>           Apply configuration keys from a file
    history [--limit N] [--json]   List recorded snooze decisions
    debug                          Dump status and config as JSON
    start | stop | restart         Manage the snoozed systemd service
    version                        Show version information
    help                           Show this help message

ENVIRONMENT:
    SNOOZE_SOCKET_PATH  Control socket path (default: {})

EXIT CODES:
    0  Success
    1  General error
    2  Syntax error
    3  Connection error
    4  Permission error
    5  Configuration error
",
        env!("CARGO_PKG_VERSION"),
        cloudsnooze::ipc::DEFAULT_SOCKET_PATH,
    );
}
