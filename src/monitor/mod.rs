// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Metric sources: per-resource probes feeding the decision engine.
//!
//! Every source fails independently. A failed probe never aborts a tick;
//! the criterion it backs is reported as missing and the engine treats
//! missing as "not idle". The daemon must never stop an instance on the
//! basis of a broken sensor.

pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod input;
pub mod memory;
pub mod network;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::types::{Criterion, SystemMetrics};

#[derive(Error, Debug)]
pub enum ProbeError {
    /// Rate sources need a prior sample; the first tick has none.
    #[error("no prior sample to compute a rate from")]
    NotYetValid,

    /// The probe mechanism does not exist on this host.
    #[error("probe unavailable: {0}")]
    Unavailable(String),

    #[error("probe IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe output unparseable: {0}")]
    Parse(String),

    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A single scalar utilization probe.
///
/// Sources are stateful only insofar as rate computation needs the previous
/// sample (network, disk).
pub trait MetricSource: Send {
    fn name(&self) -> &'static str;
    fn probe(&mut self) -> Result<f64, ProbeError>;
}

/// One tick's merged snapshot plus the criteria whose probes failed.
#[derive(Debug, Clone, Default)]
pub struct MetricsSample {
    pub metrics: SystemMetrics,
    /// Criteria with no valid reading this tick (sensor error or rate
    /// source not yet primed). Evaluated as failing by the engine.
    pub missing: Vec<Criterion>,
}

impl MetricsSample {
    pub fn is_missing(&self, criterion: Criterion) -> bool {
        self.missing.contains(&criterion)
    }
}

/// Produces one `MetricsSample` per tick.
///
/// The production implementation is [`SystemSampler`]; tests script their
/// own sequences.
#[async_trait]
pub trait Sampler: Send {
    async fn sample(&mut self, config: &Config, now: u64) -> MetricsSample;
}

/// Host sampler wiring the real sources together.
///
/// Scalar probes are cheap synchronous reads and run inline; GPU vendor
/// tools are subprocesses and run concurrently with a per-probe timeout.
pub struct SystemSampler {
    cpu: cpu::CpuSource,
    memory: memory::MemorySource,
    network: network::NetworkSource,
    disk: disk::DiskIoSource,
    input: input::InputSource,
    gpu: gpu::GpuService,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            cpu: cpu::CpuSource::new(),
            memory: memory::MemorySource::new(),
            network: network::NetworkSource::new(),
            disk: disk::DiskIoSource::new(),
            input: input::InputSource::new(),
            gpu: gpu::GpuService::detect(),
        }
    }

    fn probe_scalar(
        source: &mut dyn MetricSource,
        criterion: Criterion,
        missing: &mut Vec<Criterion>,
    ) -> f64 {
        match source.probe() {
            Ok(value) => value,
            Err(ProbeError::NotYetValid) => {
                tracing::debug!(probe = source.name(), "probe not yet valid");
                crate::telemetry::record_probe_failure(source.name());
                missing.push(criterion);
                0.0
            }
            Err(e) => {
                tracing::warn!(probe = source.name(), error = %e, "probe failed");
                crate::telemetry::record_probe_failure(source.name());
                missing.push(criterion);
                0.0
            }
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    async fn sample(&mut self, config: &Config, now: u64) -> MetricsSample {
        let mut missing = Vec::new();

        let cpu_usage_pct = Self::probe_scalar(&mut self.cpu, Criterion::Cpu, &mut missing);
        let memory_usage_pct =
            Self::probe_scalar(&mut self.memory, Criterion::Memory, &mut missing);
        let network_rate_kbps =
            Self::probe_scalar(&mut self.network, Criterion::Network, &mut missing);
        let disk_io_rate_kbps =
            Self::probe_scalar(&mut self.disk, Criterion::Disk, &mut missing);
        let input_idle_seconds =
            Self::probe_scalar(&mut self.input, Criterion::Input, &mut missing) as u64;

        let gpu_metrics = if config.gpu_monitoring_enabled {
            match self.gpu.collect().await {
                Ok(devices) => devices,
                Err(e) => {
                    tracing::warn!(error = %e, "gpu probe failed");
                    crate::telemetry::record_probe_failure("gpu");
                    missing.push(Criterion::Gpu);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        MetricsSample {
            metrics: SystemMetrics {
                cpu_usage_pct,
                memory_usage_pct,
                network_rate_kbps,
                disk_io_rate_kbps,
                input_idle_seconds,
                gpu_metrics,
                collection_time: now,
            },
            missing,
        }
    }
}
