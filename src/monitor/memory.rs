// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Memory utilization source.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use super::{MetricSource, ProbeError};

/// Used-memory percentage of total RAM. Instantaneous, valid from the
/// first tick.
pub struct MemorySource {
    sys: System,
}

impl MemorySource {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );
        Self { sys }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn probe(&mut self) -> Result<f64, ProbeError> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(ProbeError::Unavailable("total memory reported as zero".into()));
        }
        Ok(self.sys.used_memory() as f64 / total as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_reports_percentage() {
        let mut source = MemorySource::new();
        let value = source.probe().unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_name() {
        assert_eq!(MemorySource::new().name(), "memory");
    }
}
