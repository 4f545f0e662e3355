// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! The composite idle predicate.
//!
//! A snapshot is idle iff every enabled criterion holds. A criterion whose
//! probe failed counts as failing: unknown means "not idle".

use crate::config::Config;
use crate::monitor::MetricsSample;
use crate::types::Criterion;

/// Find the first failing criterion in canonical order, with a
/// human-readable explanation. `None` means the snapshot is idle.
pub fn first_failure(sample: &MetricsSample, config: &Config) -> Option<String> {
    for criterion in Criterion::ALL {
        if let Some(reason) = check(criterion, sample, config) {
            return Some(reason);
        }
    }
    None
}

/// `Some(reason)` when `criterion` blocks idleness.
fn check(criterion: Criterion, sample: &MetricsSample, config: &Config) -> Option<String> {
    let metrics = &sample.metrics;
    match criterion {
        Criterion::Cpu => threshold_check(
            sample,
            criterion,
            metrics.cpu_usage_pct,
            config.cpu_threshold_percent,
            "%",
        ),
        Criterion::Memory => threshold_check(
            sample,
            criterion,
            metrics.memory_usage_pct,
            config.memory_threshold_percent,
            "%",
        ),
        Criterion::Network => threshold_check(
            sample,
            criterion,
            metrics.network_rate_kbps,
            config.network_threshold_kbps,
            " KB/s",
        ),
        Criterion::Disk => threshold_check(
            sample,
            criterion,
            metrics.disk_io_rate_kbps,
            config.disk_io_threshold_kbps,
            " KB/s",
        ),
        Criterion::Input => {
            // Inverted direction: more idle seconds is better.
            let threshold = config.input_idle_threshold_secs;
            if sample.is_missing(criterion) {
                return Some(format!("input: unknown (threshold {}s)", threshold));
            }
            if metrics.input_idle_seconds < threshold {
                return Some(format!(
                    "input: idle {}s (threshold {}s)",
                    metrics.input_idle_seconds, threshold
                ));
            }
            None
        }
        Criterion::Gpu => {
            // Disabled monitoring makes the criterion vacuously true.
            if !config.gpu_monitoring_enabled {
                return None;
            }
            let threshold = config.gpu_threshold_percent;
            if sample.is_missing(criterion) {
                return Some(format!("gpu: unknown (threshold {}%)", threshold));
            }
            let busiest = metrics
                .gpu_metrics
                .iter()
                .map(|d| d.utilization_pct)
                .fold(0.0_f64, f64::max);
            if busiest > threshold {
                return Some(format!("gpu: {}% (threshold {}%)", busiest, threshold));
            }
            None
        }
    }
}

fn threshold_check(
    sample: &MetricsSample,
    criterion: Criterion,
    value: f64,
    threshold: f64,
    unit: &str,
) -> Option<String> {
    if sample.is_missing(criterion) {
        return Some(format!(
            "{}: unknown (threshold {}{})",
            criterion.name(),
            threshold,
            unit
        ));
    }
    if value > threshold {
        return Some(format!(
            "{}: {}{} (threshold {}{})",
            criterion.name(),
            value,
            unit,
            threshold,
            unit
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GpuDeviceMetrics, SystemMetrics};

    fn idle_sample() -> MetricsSample {
        MetricsSample {
            metrics: SystemMetrics {
                cpu_usage_pct: 1.0,
                memory_usage_pct: 5.0,
                network_rate_kbps: 0.0,
                disk_io_rate_kbps: 0.0,
                input_idle_seconds: 1000,
                gpu_metrics: Vec::new(),
                collection_time: 0,
            },
            missing: Vec::new(),
        }
    }

    fn gpu(utilization_pct: f64) -> GpuDeviceMetrics {
        GpuDeviceMetrics {
            id: 0,
            vendor: "nvidia".into(),
            model: "T4".into(),
            utilization_pct,
            memory_used_bytes: 0,
            memory_total_bytes: 0,
            temperature_c: 30.0,
        }
    }

    #[test]
    fn test_all_criteria_idle() {
        assert_eq!(first_failure(&idle_sample(), &Config::default()), None);
    }

    #[test]
    fn test_busy_cpu_fails_with_value_and_threshold() {
        let mut sample = idle_sample();
        sample.metrics.cpu_usage_pct = 80.0;
        let reason = first_failure(&sample, &Config::default()).unwrap();
        assert_eq!(reason, "cpu: 80% (threshold 10%)");
    }

    #[test]
    fn test_missing_cpu_fails_as_unknown() {
        let mut sample = idle_sample();
        sample.missing.push(Criterion::Cpu);
        let reason = first_failure(&sample, &Config::default()).unwrap();
        assert_eq!(reason, "cpu: unknown (threshold 10%)");
    }

    #[test]
    fn test_value_at_threshold_is_idle() {
        let mut sample = idle_sample();
        sample.metrics.cpu_usage_pct = 10.0;
        sample.metrics.memory_usage_pct = 30.0;
        assert_eq!(first_failure(&sample, &Config::default()), None);
    }

    #[test]
    fn test_canonical_order_reports_first_failure() {
        let mut sample = idle_sample();
        sample.metrics.memory_usage_pct = 90.0;
        sample.metrics.network_rate_kbps = 500.0;
        let reason = first_failure(&sample, &Config::default()).unwrap();
        assert!(reason.starts_with("memory:"), "got {reason}");
    }

    #[test]
    fn test_input_direction_is_inverted() {
        let mut sample = idle_sample();
        sample.metrics.input_idle_seconds = 10;
        let reason = first_failure(&sample, &Config::default()).unwrap();
        assert_eq!(reason, "input: idle 10s (threshold 900s)");
    }

    #[test]
    fn test_gpu_busy_blocks_idle() {
        let mut sample = idle_sample();
        sample.metrics.gpu_metrics = vec![gpu(1.0), gpu(50.0)];
        let reason = first_failure(&sample, &Config::default()).unwrap();
        assert_eq!(reason, "gpu: 50% (threshold 5%)");
    }

    #[test]
    fn test_gpu_disabled_is_vacuously_idle() {
        let mut config = Config::default();
        config.gpu_monitoring_enabled = false;
        let mut sample = idle_sample();
        sample.metrics.gpu_metrics = vec![gpu(99.0)];
        // Even a missing GPU probe cannot block sleep when disabled.
        sample.missing.push(Criterion::Gpu);
        assert_eq!(first_failure(&sample, &config), None);
    }

    #[test]
    fn test_no_gpus_detected_is_idle() {
        let sample = idle_sample();
        assert_eq!(first_failure(&sample, &Config::default()), None);
    }

    #[test]
    fn test_network_unit_in_reason() {
        let mut sample = idle_sample();
        sample.metrics.network_rate_kbps = 120.0;
        let reason = first_failure(&sample, &Config::default()).unwrap();
        assert_eq!(reason, "network: 120 KB/s (threshold 50 KB/s)");
    }
}
