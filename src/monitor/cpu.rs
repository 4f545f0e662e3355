// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! CPU utilization source.

use sysinfo::{CpuRefreshKind, RefreshKind, System};

use super::{MetricSource, ProbeError};

/// Global CPU utilization averaged over the interval since the prior probe.
///
/// The first probe has no prior interval and reports `NotYetValid`.
pub struct CpuSource {
    sys: System,
    primed: bool,
}

impl CpuSource {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new().with_cpu_usage()),
        );
        Self { sys, primed: false }
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for CpuSource {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn probe(&mut self) -> Result<f64, ProbeError> {
        self.sys.refresh_cpu_usage();
        if !self.primed {
            self.primed = true;
            return Err(ProbeError::NotYetValid);
        }
        Ok(f64::from(self.sys.global_cpu_info().cpu_usage()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_probe_not_yet_valid() {
        let mut source = CpuSource::new();
        assert!(matches!(source.probe(), Err(ProbeError::NotYetValid)));
    }

    #[test]
    fn test_second_probe_in_range() {
        let mut source = CpuSource::new();
        let _ = source.probe();
        let value = source.probe().unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_name() {
        assert_eq!(CpuSource::new().name(), "cpu");
    }
}
