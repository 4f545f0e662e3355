// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! `snooze history` - list recorded snooze decisions.

use super::{exit_code, exit_code_for, SnoozeClient};

pub async fn run_history(socket_path: &str, limit: usize, json_output: bool) -> i32 {
    let client = SnoozeClient::new(socket_path.to_string());
    match client.history(limit).await {
        Ok(events) => {
            if json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&events).unwrap_or_else(|_| events.to_string())
                );
                return exit_code::SUCCESS;
            }

            let Some(list) = events.as_array() else {
                eprintln!("Error: unexpected history payload");
                return exit_code::GENERAL;
            };
            if list.is_empty() {
                println!("No snooze events recorded");
                return exit_code::SUCCESS;
            }
            for event in list {
                println!(
                    "{}  {}  {}",
                    event["timestamp"].as_u64().unwrap_or(0),
                    event["instance_id"].as_str().unwrap_or("-"),
                    event["reason"].as_str().unwrap_or(""),
                );
            }
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code_for(&e)
        }
    }
}
