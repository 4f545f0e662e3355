// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! `snooze config` - list, get, set, reset, import, export.
//!
//! Every mutation goes through CONFIG_SET so the daemon stays the single
//! writer of its config file.

use super::{exit_code, exit_code_for, SnoozeClient};
use crate::config::Config;

pub async fn run_config(socket_path: &str, args: &[String]) -> i32 {
    let action = args.first().map(|s| s.as_str()).unwrap_or("list");
    let client = SnoozeClient::new(socket_path.to_string());

    match action {
        "list" => list(&client).await,
        "get" => {
            let Some(name) = args.get(1) else {
                eprintln!("Usage: snooze config get <name>");
                return exit_code::SYNTAX;
            };
            get(&client, name).await
        }
        "set" => {
            let (Some(name), Some(value)) = (args.get(1), args.get(2)) else {
                eprintln!("Usage: snooze config set <name> <value>");
                return exit_code::SYNTAX;
            };
            set(&client, name, value).await
        }
        "reset" => reset(&client).await,
        "export" => export(&client, args.get(1)).await,
        "import" => {
            let Some(path) = args.get(1) else {
                eprintln!("Usage: snooze config import <file>");
                return exit_code::SYNTAX;
            };
            import(&client, path).await
        }
        other => {
            eprintln!("Unknown config action: {}", other);
            exit_code::SYNTAX
        }
    }
}

async fn list(client: &SnoozeClient) -> i32 {
    match client.config_get().await {
        Ok(config) => {
            if let Some(map) = config.as_object() {
                for (key, value) in map {
                    println!("{} = {}", key, value);
                }
            }
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code_for(&e)
        }
    }
}

async fn get(client: &SnoozeClient, name: &str) -> i32 {
    match client.config_get().await {
        Ok(config) => match config.get(name) {
            Some(value) => {
                println!("{}", value);
                exit_code::SUCCESS
            }
            None => {
                eprintln!("Unknown config key: {}", name);
                exit_code::CONFIG
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code_for(&e)
        }
    }
}

async fn set(client: &SnoozeClient, name: &str, value: &str) -> i32 {
    // Values arrive as strings; the daemon coerces per key.
    match client
        .config_set(name, serde_json::Value::String(value.to_string()))
        .await
    {
        Ok(updated) => {
            println!("{} = {}", name, updated["value"]);
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code_for(&e)
        }
    }
}

async fn reset(client: &SnoozeClient) -> i32 {
    let defaults = match serde_json::to_value(Config::default()) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => {
            eprintln!("Error: could not build default configuration");
            return exit_code::GENERAL;
        }
    };
    for (name, value) in defaults {
        if let Err(e) = client.config_set(&name, value).await {
            eprintln!("Error resetting {}: {}", name, e);
            return exit_code_for(&e);
        }
    }
    println!("Configuration reset to defaults");
    exit_code::SUCCESS
}

async fn export(client: &SnoozeClient, path: Option<&String>) -> i32 {
    match client.config_get().await {
        Ok(config) => {
            let pretty = serde_json::to_string_pretty(&config)
                .unwrap_or_else(|_| config.to_string());
            match path {
                Some(path) => {
                    if let Err(e) = std::fs::write(path, pretty) {
                        eprintln!("Error writing {}: {}", path, e);
                        return exit_code::GENERAL;
                    }
                    println!("Exported configuration to {}", path);
                }
                None => println!("{}", pretty),
            }
            exit_code::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_code_for(&e)
        }
    }
}

async fn import(client: &SnoozeClient, path: &str) -> i32 {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("Error reading {}: {}", path, e);
            return exit_code::CONFIG;
        }
    };
    let parsed: serde_json::Value = match serde_json::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error parsing {}: {}", path, e);
            return exit_code::CONFIG;
        }
    };
    let Some(map) = parsed.as_object() else {
        eprintln!("Error: {} is not a JSON object", path);
        return exit_code::CONFIG;
    };

    for (name, value) in map {
        if let Err(e) = client.config_set(name, value.clone()).await {
            eprintln!("Error importing {}: {}", name, e);
            return exit_code_for(&e);
        }
    }
    println!("Imported configuration from {}", path);
    exit_code::SUCCESS
}
