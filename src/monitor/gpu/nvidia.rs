// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! NVIDIA GPU monitor backed by `nvidia-smi`.

use async_trait::async_trait;

use super::GpuMonitor;
use crate::monitor::ProbeError;
use crate::types::GpuDeviceMetrics;

const QUERY_FIELDS: &str = "index,name,utilization.gpu,memory.used,memory.total,temperature.gpu";

pub struct NvidiaSmi {
    binary: String,
}

impl NvidiaSmi {
    /// Detect the tool by listing devices. Missing tool means "no NVIDIA
    /// monitoring on this host", not an error.
    pub fn detect() -> Option<Self> {
        let probe = std::process::Command::new("nvidia-smi")
            .arg("--list-gpus")
            .output();
        match probe {
            Ok(output) if output.status.success() => Some(Self {
                binary: "nvidia-smi".to_string(),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl GpuMonitor for NvidiaSmi {
    fn vendor(&self) -> &'static str {
        "nvidia"
    }

    async fn probe(&self) -> Result<Vec<GpuDeviceMetrics>, ProbeError> {
        let output = tokio::process::Command::new(&self.binary)
            .arg(format!("--query-gpu={}", QUERY_FIELDS))
            .arg("--format=csv,noheader,nounits")
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Parse(format!(
                "nvidia-smi exited with {}",
                output.status
            )));
        }

        parse_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `--format=csv,noheader,nounits` rows. Memory values are MiB.
fn parse_query_output(output: &str) -> Result<Vec<GpuDeviceMetrics>, ProbeError> {
    let mut devices = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(ProbeError::Parse(format!(
                "expected 6 csv fields, got {}: {:?}",
                fields.len(),
                line
            )));
        }
        devices.push(GpuDeviceMetrics {
            id: parse_field(fields[0], "index")?,
            vendor: "nvidia".to_string(),
            model: fields[1].to_string(),
            utilization_pct: parse_field(fields[2], "utilization.gpu")?,
            memory_used_bytes: parse_field::<u64>(fields[3], "memory.used")? * 1024 * 1024,
            memory_total_bytes: parse_field::<u64>(fields[4], "memory.total")? * 1024 * 1024,
            temperature_c: parse_field(fields[5], "temperature.gpu")?,
        });
    }
    Ok(devices)
}

fn parse_field<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, ProbeError> {
    raw.parse()
        .map_err(|_| ProbeError::Parse(format!("bad {} value: {:?}", field, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_device() {
        let out = "0, Tesla T4, 3, 105, 15360, 44\n";
        let devices = parse_query_output(out).unwrap();
        assert_eq!(devices.len(), 1);
        let d = &devices[0];
        assert_eq!(d.id, 0);
        assert_eq!(d.model, "Tesla T4");
        assert_eq!(d.utilization_pct, 3.0);
        assert_eq!(d.memory_used_bytes, 105 * 1024 * 1024);
        assert_eq!(d.memory_total_bytes, 15360 * 1024 * 1024);
        assert_eq!(d.temperature_c, 44.0);
        assert_eq!(d.vendor, "nvidia");
    }

    #[test]
    fn test_parse_multi_device() {
        let out = "0, A100-SXM4-40GB, 97, 39000, 40960, 61\n1, A100-SXM4-40GB, 0, 3, 40960, 29\n";
        let devices = parse_query_output(out).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].id, 1);
        assert_eq!(devices[1].utilization_pct, 0.0);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_query_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_query_output("not,a,gpu\n").is_err());
        assert!(parse_query_output("x, T4, 3, 105, 15360, 44\n").is_err());
    }
}
