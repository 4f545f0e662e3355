// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Disk I/O throughput source.
//!
//! Linux-only: reads cumulative sector counters from `/proc/diskstats` and
//! differences them against the previous probe. Partitions are excluded so
//! device and partition traffic is not double-counted.

use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;

use super::{MetricSource, ProbeError};

const SECTOR_BYTES: u64 = 512;

/// Whole-disk device names (sda, vdb, xvdf, nvme0n1, mmcblk0). Partition
/// rows like sda1 or nvme0n1p2 must not match.
fn device_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(sd[a-z]+|hd[a-z]+|vd[a-z]+|xvd[a-z]+|nvme\d+n\d+|mmcblk\d+)$")
            .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

/// Sum of read+write rates across all whole-disk devices, in KB/s.
pub struct DiskIoSource {
    last: Option<(Instant, u64)>,
}

impl DiskIoSource {
    pub fn new() -> Self {
        Self { last: None }
    }

    #[cfg(target_os = "linux")]
    fn total_bytes(&self) -> Result<u64, ProbeError> {
        let contents = std::fs::read_to_string("/proc/diskstats")?;
        Ok(parse_diskstats(&contents))
    }

    #[cfg(not(target_os = "linux"))]
    fn total_bytes(&self) -> Result<u64, ProbeError> {
        Err(ProbeError::Unavailable(
            "disk counters require /proc/diskstats".into(),
        ))
    }
}

impl Default for DiskIoSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum sectors read (field 6) and written (field 10) for whole-disk rows.
fn parse_diskstats(contents: &str) -> u64 {
    let mut sectors: u64 = 0;
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        if !device_pattern().is_match(fields[2]) {
            continue;
        }
        let read_sectors: u64 = fields[5].parse().unwrap_or(0);
        let written_sectors: u64 = fields[9].parse().unwrap_or(0);
        sectors = sectors
            .saturating_add(read_sectors)
            .saturating_add(written_sectors);
    }
    sectors.saturating_mul(SECTOR_BYTES)
}

impl MetricSource for DiskIoSource {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn probe(&mut self) -> Result<f64, ProbeError> {
        let total = self.total_bytes()?;
        let now = Instant::now();

        let Some((prev_at, prev_total)) = self.last.replace((now, total)) else {
            return Err(ProbeError::NotYetValid);
        };

        let elapsed = now.duration_since(prev_at).as_secs_f64();
        if elapsed <= 0.0 {
            return Err(ProbeError::NotYetValid);
        }
        let delta = total.saturating_sub(prev_total);
        Ok(delta as f64 / 1024.0 / elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
   8       0 sda 1000 0 2048 0 500 0 4096 0 0 0 0
   8       1 sda1 900 0 1024 0 400 0 2048 0 0 0 0
 259       0 nvme0n1 10 0 100 0 10 0 100 0 0 0 0
   7       0 loop0 5 0 50 0 0 0 0 0 0 0 0
";

    #[test]
    fn test_parse_skips_partitions_and_loops() {
        // sda: 2048+4096 sectors, nvme0n1: 100+100. sda1 and loop0 excluded.
        let bytes = parse_diskstats(SAMPLE);
        assert_eq!(bytes, (2048 + 4096 + 100 + 100) * SECTOR_BYTES);
    }

    #[test]
    fn test_device_pattern() {
        for ok in ["sda", "sdaa", "vdb", "xvdf", "nvme0n1", "nvme10n2", "mmcblk0", "hdc"] {
            assert!(device_pattern().is_match(ok), "{ok} should match");
        }
        for bad in ["sda1", "nvme0n1p1", "loop0", "ram0", "dm-0", "mmcblk0p2", "zram0"] {
            assert!(!device_pattern().is_match(bad), "{bad} should not match");
        }
    }

    #[test]
    fn test_parse_tolerates_short_lines() {
        assert_eq!(parse_diskstats("8 0 sda\n\n"), 0);
    }

    #[test]
    fn test_first_probe_not_yet_valid_on_linux() {
        #[cfg(target_os = "linux")]
        {
            let mut source = DiskIoSource::new();
            assert!(matches!(source.probe(), Err(ProbeError::NotYetValid)));
        }
    }

    #[test]
    fn test_name() {
        assert_eq!(DiskIoSource::new().name(), "disk");
    }
}
