// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! GPU monitoring service.
//!
//! Vendor monitors wrap the vendor's query tool (`nvidia-smi`, `rocm-smi`).
//! Availability is decided once at startup by detecting the tool; a missing
//! tool simply means the vendor is not monitored. A tool that is present
//! but produces unparseable output is a probe error: the GPU criterion goes
//! missing and the engine fails closed.

pub mod amd;
pub mod nvidia;

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use super::ProbeError;
use crate::types::GpuDeviceMetrics;

/// Per-probe subprocess timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One vendor's GPU query tool.
#[async_trait]
pub trait GpuMonitor: Send + Sync {
    fn vendor(&self) -> &'static str;

    /// Query all devices this vendor tool can see.
    async fn probe(&self) -> Result<Vec<GpuDeviceMetrics>, ProbeError>;
}

/// Aggregates all available vendor monitors.
pub struct GpuService {
    monitors: Vec<Box<dyn GpuMonitor>>,
}

impl GpuService {
    /// Detect vendor tools on this host.
    pub fn detect() -> Self {
        let mut monitors: Vec<Box<dyn GpuMonitor>> = Vec::new();
        if let Some(m) = nvidia::NvidiaSmi::detect() {
            tracing::info!("gpu monitor available: nvidia-smi");
            monitors.push(Box::new(m));
        }
        if let Some(m) = amd::RocmSmi::detect() {
            tracing::info!("gpu monitor available: rocm-smi");
            monitors.push(Box::new(m));
        }
        Self { monitors }
    }

    /// Build from explicit monitors (tests and embedding).
    pub fn with_monitors(monitors: Vec<Box<dyn GpuMonitor>>) -> Self {
        Self { monitors }
    }

    pub fn is_available(&self) -> bool {
        !self.monitors.is_empty()
    }

    /// Run all available monitors concurrently and concatenate their device
    /// lists. Any monitor failure fails the whole collection.
    pub async fn collect(&self) -> Result<Vec<GpuDeviceMetrics>, ProbeError> {
        if self.monitors.is_empty() {
            return Ok(Vec::new());
        }

        let probes = self.monitors.iter().map(|m| async move {
            match tokio::time::timeout(PROBE_TIMEOUT, m.probe()).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(PROBE_TIMEOUT)),
            }
        });

        let mut devices = Vec::new();
        for result in join_all(probes).await {
            devices.extend(result?);
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticMonitor(Vec<GpuDeviceMetrics>);

    #[async_trait]
    impl GpuMonitor for StaticMonitor {
        fn vendor(&self) -> &'static str {
            "test"
        }
        async fn probe(&self) -> Result<Vec<GpuDeviceMetrics>, ProbeError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenMonitor;

    #[async_trait]
    impl GpuMonitor for BrokenMonitor {
        fn vendor(&self) -> &'static str {
            "broken"
        }
        async fn probe(&self) -> Result<Vec<GpuDeviceMetrics>, ProbeError> {
            Err(ProbeError::Parse("garbage".into()))
        }
    }

    fn device(id: u32) -> GpuDeviceMetrics {
        GpuDeviceMetrics {
            id,
            vendor: "test".into(),
            model: "model".into(),
            utilization_pct: 1.0,
            memory_used_bytes: 0,
            memory_total_bytes: 0,
            temperature_c: 30.0,
        }
    }

    #[tokio::test]
    async fn test_collect_with_no_monitors_is_empty() {
        let service = GpuService::with_monitors(Vec::new());
        assert!(!service.is_available());
        assert!(service.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collect_concatenates_monitors() {
        let service = GpuService::with_monitors(vec![
            Box::new(StaticMonitor(vec![device(0)])),
            Box::new(StaticMonitor(vec![device(1), device(2)])),
        ]);
        let devices = service.collect().await.unwrap();
        assert_eq!(devices.len(), 3);
    }

    #[tokio::test]
    async fn test_collect_fails_closed_on_monitor_error() {
        let service = GpuService::with_monitors(vec![
            Box::new(StaticMonitor(vec![device(0)])),
            Box::new(BrokenMonitor),
        ]);
        assert!(service.collect().await.is_err());
    }
}
