// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! AMD GPU monitor backed by `rocm-smi`.

use async_trait::async_trait;

use super::GpuMonitor;
use crate::monitor::ProbeError;
use crate::types::GpuDeviceMetrics;

pub struct RocmSmi {
    binary: String,
}

impl RocmSmi {
    pub fn detect() -> Option<Self> {
        let probe = std::process::Command::new("rocm-smi")
            .arg("--version")
            .output();
        match probe {
            Ok(output) if output.status.success() => Some(Self {
                binary: "rocm-smi".to_string(),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl GpuMonitor for RocmSmi {
    fn vendor(&self) -> &'static str {
        "amd"
    }

    async fn probe(&self) -> Result<Vec<GpuDeviceMetrics>, ProbeError> {
        let output = tokio::process::Command::new(&self.binary)
            .args([
                "--showproductname",
                "--showuse",
                "--showmeminfo",
                "vram",
                "--showtemp",
                "--json",
            ])
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Parse(format!(
                "rocm-smi exited with {}",
                output.status
            )));
        }

        parse_json_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `rocm-smi --json`: an object keyed `card0`, `card1`, ... with
/// stringly-typed values. Utilization and VRAM counters are required;
/// temperature and product name are best-effort.
fn parse_json_output(output: &str) -> Result<Vec<GpuDeviceMetrics>, ProbeError> {
    let root: serde_json::Value = serde_json::from_str(output)
        .map_err(|e| ProbeError::Parse(format!("rocm-smi json: {}", e)))?;
    let obj = root
        .as_object()
        .ok_or_else(|| ProbeError::Parse("rocm-smi json root is not an object".into()))?;

    let mut devices = Vec::new();
    for (key, card) in obj {
        let Some(index) = key.strip_prefix("card") else {
            continue;
        };
        let id: u32 = index
            .parse()
            .map_err(|_| ProbeError::Parse(format!("bad card key: {:?}", key)))?;

        let utilization_pct = required_f64(card, "GPU use (%)", key)?;
        let memory_total_bytes = required_f64(card, "VRAM Total Memory (B)", key)? as u64;
        let memory_used_bytes = required_f64(card, "VRAM Total Used Memory (B)", key)? as u64;

        devices.push(GpuDeviceMetrics {
            id,
            vendor: "amd".to_string(),
            model: string_field(card, "Card series").unwrap_or_else(|| "unknown".to_string()),
            utilization_pct,
            memory_used_bytes,
            memory_total_bytes,
            temperature_c: temperature_field(card).unwrap_or(0.0),
        });
    }
    devices.sort_by_key(|d| d.id);
    Ok(devices)
}

fn required_f64(card: &serde_json::Value, field: &str, key: &str) -> Result<f64, ProbeError> {
    let raw = card
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProbeError::Parse(format!("{}: missing {:?}", key, field)))?;
    raw.trim()
        .parse()
        .map_err(|_| ProbeError::Parse(format!("{}: bad {:?} value {:?}", key, field, raw)))
}

fn string_field(card: &serde_json::Value, field: &str) -> Option<String> {
    card.get(field).and_then(|v| v.as_str()).map(str::to_string)
}

/// Edge sensor preferred; any temperature key accepted.
fn temperature_field(card: &serde_json::Value) -> Option<f64> {
    let obj = card.as_object()?;
    let mut fallback = None;
    for (key, value) in obj {
        if !key.starts_with("Temperature") {
            continue;
        }
        let parsed = value.as_str().and_then(|s| s.trim().parse().ok());
        if key.contains("edge") {
            return parsed;
        }
        fallback = fallback.or(parsed);
    }
    fallback
}
