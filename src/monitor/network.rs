// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network throughput source.

use std::time::Instant;

use sysinfo::Networks;

use super::{MetricSource, ProbeError};

/// Aggregate network rate in KB/s across all interfaces, computed by
/// differencing cumulative byte counters against the previous probe.
pub struct NetworkSource {
    networks: Networks,
    last: Option<(Instant, u64)>,
}

impl NetworkSource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            last: None,
        }
    }

    fn total_bytes(&self) -> u64 {
        self.networks
            .iter()
            .map(|(_, data)| data.total_received() + data.total_transmitted())
            .sum()
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for NetworkSource {
    fn name(&self) -> &'static str {
        "network"
    }

    fn probe(&mut self) -> Result<f64, ProbeError> {
        self.networks.refresh();
        let now = Instant::now();
        let total = self.total_bytes();

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

    #[test]
    fn test_first_probe_not_yet_valid() {
        let mut source = NetworkSource::new();
        assert!(matches!(source.probe(), Err(ProbeError::NotYetValid)));
    }

    #[test]
    fn test_second_probe_nonnegative() {
        let mut source = NetworkSource::new();
        let _ = source.probe();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let rate = source.probe().unwrap();
        assert!(rate >= 0.0);
    }

    #[test]
    fn test_name() {
        assert_eq!(NetworkSource::new().name(), "network");
    }
}
