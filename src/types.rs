//! Shared data model for the daemon core.
//!
//! `SystemMetrics`, `InstanceInfo`, and friends live in this leaf module so
//! that both the monitor side (which produces snapshots) and the cloud side
//! (which consumes them for tagging) can depend on them without a back-edge.

use serde::{Deserialize, Serialize};

/// Per-device GPU reading, one entry per detected device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDeviceMetrics {
    /// Device index as reported by the vendor tool.
    pub id: u32,
    /// Vendor name ("nvidia", "amd").
    pub vendor: String,
    /// Device model string.
    pub model: String,
    pub utilization_pct: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub temperature_c: f64,
}

/// One immutable metric snapshot per tick.
///
/// Snapshots are value objects: freely cloned and shared. A field whose
/// source failed carries zero here and is listed as missing in the
/// accompanying sample (see `monitor::MetricsSample`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage_pct: f64,
    pub memory_usage_pct: f64,
    /// Moving-interval rate across all interfaces.
    pub network_rate_kbps: f64,
    /// Sum of per-device read+write rates.
    pub disk_io_rate_kbps: f64,
    /// Seconds since last keyboard/mouse/tty activity.
    pub input_idle_seconds: u64,
    #[serde(default)]
    pub gpu_metrics: Vec<GpuDeviceMetrics>,
    /// Epoch seconds at collection time.
    pub collection_time: u64,
}

/// Identity of the instance the daemon runs on.
///
/// Immutable per process lifetime; re-queried only on explicit refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    pub region: String,
    pub provider: String,
    /// ISO-8601 launch timestamp, empty when the provider does not expose it.
    #[serde(default)]
    pub launch_time: String,
    #[serde(default)]
    pub tags: std::collections::BTreeMap<String, String>,
}

/// History record of one snooze decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeEvent {
    /// Epoch seconds of the decision.
    pub timestamp: u64,
    pub reason: String,
    pub metrics_snapshot: SystemMetrics,
    /// Empty in local-only mode.
    pub instance_id: String,
}

/// Idle criteria in canonical evaluation order.
///
/// The order is load-bearing: "why not idle" reasons always name the first
/// failing criterion in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Cpu,
    Memory,
    Network,
    Disk,
    Input,
    Gpu,
}

impl Criterion {
    /// All criteria in canonical order.
    pub const ALL: [Criterion; 6] = [
        Criterion::Cpu,
        Criterion::Memory,
        Criterion::Network,
        Criterion::Disk,
        Criterion::Input,
        Criterion::Gpu,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::Cpu => "cpu",
            Criterion::Memory => "memory",
            Criterion::Network => "network",
            Criterion::Disk => "disk",
            Criterion::Input => "input",
            Criterion::Gpu => "gpu",
        }
    }
}

/// Engine verdict for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Awake,
    Idle,
    ShouldSnooze,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Awake => write!(f, "awake"),
            Verdict::Idle => write!(f, "idle"),
            Verdict::ShouldSnooze => write!(f, "should_snooze"),
        }
    }
}
