// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! `snooze status` - render the daemon's STATUS report.

use super::{exit_code, exit_code_for, SnoozeClient};

/// Run the status command. Returns the process exit code.
pub async fn run_status(socket_path: &str, json_output: bool) -> i32 {
    let client = SnoozeClient::new(socket_path.to_string());
    match client.status().await {
        Ok(status) => {
            if json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status).unwrap_or_else(|_| status.to_string())
                );
            } else {
                print_human(&status);
            }
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code_for(&e)
        }
    }
}

fn print_human(status: &serde_json::Value) {
    let should_snooze = status["should_snooze"].as_bool().unwrap_or(false);
    let paused = status["paused"].as_bool().unwrap_or(false);
    let state = if paused {
        "paused"
    } else if should_snooze {
        "ready to snooze"
    } else if status["idle_since"].is_u64() {
        "idle"
    } else {
        "awake"
    };

    println!("State:   {}", state);
    if let Some(reason) = status["snooze_reason"].as_str() {
        if !reason.is_empty() {
            println!("Reason:  {}", reason);
        }
    }
    if let Some(idle_since) = status["idle_since"].as_u64() {
        println!("Idle since: {} (epoch)", idle_since);
    }

    let metrics = &status["metrics"];
    if metrics.is_object() {
        println!("Metrics:");
        println!("  CPU:        {:>8.1}%", metrics["cpu_usage_pct"].as_f64().unwrap_or(0.0));
        println!(
            "  Memory:     {:>8.1}%",
            metrics["memory_usage_pct"].as_f64().unwrap_or(0.0)
        );
        println!(
            "  Network:    {:>8.1} KB/s",
            metrics["network_rate_kbps"].as_f64().unwrap_or(0.0)
        );
        println!(
            "  Disk I/O:   {:>8.1} KB/s",
            metrics["disk_io_rate_kbps"].as_f64().unwrap_or(0.0)
        );
        println!(
            "  Input idle: {:>8}s",
            metrics["input_idle_seconds"].as_u64().unwrap_or(0)
        );
        if let Some(gpus) = metrics["gpu_metrics"].as_array() {
            for gpu in gpus {
                println!(
                    "  GPU {}:      {:>8.1}% ({})",
                    gpu["id"].as_u64().unwrap_or(0),
                    gpu["utilization_pct"].as_f64().unwrap_or(0.0),
                    gpu["model"].as_str().unwrap_or("unknown"),
                );
            }
        }
    } else {
        println!("Metrics: none collected yet");
    }

    if let Some(version) = status["version"].as_str() {
        println!("Daemon:  snoozed {}", version);
    }
}

/// `snooze debug` - dump status and config as one JSON document.
pub async fn run_debug(socket_path: &str) -> i32 {
    let client = SnoozeClient::new(socket_path.to_string());
    let status = match client.status().await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };
    let config = match client.config_get().await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };

    let dump = serde_json::json!({ "status": status, "config": config });
    println!(
        "{}",
        serde_json::to_string_pretty(&dump).unwrap_or_else(|_| dump.to_string())
    );
    exit_code::SUCCESS
}
