// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cloud provider plugins.
//!
//! A provider turns a snooze verdict into a `StopInstance` action. Plugins
//! self-describe, detect whether the host runs on their cloud, and build
//! the concrete [`CloudProvider`] the control loop drives. The registry is
//! ordered: auto-detection asks each plugin in registration order and the
//! first positive detection wins.

pub mod aws;
pub mod azure;
pub mod gcp;
pub(crate) mod sigv4;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::config::Config;
use crate::types::{InstanceInfo, SystemMetrics};

/// Timeout for link-local metadata service calls.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for provider control-plane calls (tag, stop).
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Value written for the `StoppedBy` tag.
pub const STOPPED_BY: &str = "CloudSnooze";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("operation not authorized: {0}")]
    Permission(String),

    #[error("{provider} API error: {message}")]
    Api { provider: &'static str, message: String },

    #[error("metadata service error: {0}")]
    Metadata(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("plugin already registered: {0}")]
    AlreadyRegistered(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Whether this error means "authenticated but not allowed".
    pub fn is_permission(&self) -> bool {
        matches!(self, ProviderError::Permission(_))
    }
}

/// Map of instance tags, bare keys (no prefix applied).
pub type TagMap = BTreeMap<String, String>;

/// Static plugin self-description.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PluginInfo {
    pub id: &'static str,
    pub name: &'static str,
    /// Plugin kind; builtin plugins are all `"cloud-provider"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: &'static str,
    pub capabilities: &'static [&'static str],
}

/// Tagging behavior derived from config.
#[derive(Debug, Clone)]
pub struct TagSettings {
    pub enabled: bool,
    pub prefix: String,
    pub detailed: bool,
}

impl From<&Config> for TagSettings {
    fn from(config: &Config) -> Self {
        Self {
            enabled: config.enable_instance_tags,
            prefix: config.tagging_prefix.clone(),
            detailed: config.detailed_instance_tags,
        }
    }
}

/// Build the tag set written on stop. Keys are bare; each provider applies
/// the prefix with its own separator rules.
pub fn build_stop_tags(
    settings: &TagSettings,
    reason: &str,
    metrics: &SystemMetrics,
    at: DateTime<Utc>,
) -> TagMap {
    let mut tags = TagMap::new();
    tags.insert("StoppedBy".to_string(), STOPPED_BY.to_string());
    tags.insert(
        "StoppedAt".to_string(),
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    tags.insert("Reason".to_string(), reason.to_string());

    if settings.detailed {
        tags.insert("CpuPercent".to_string(), format!("{:.1}", metrics.cpu_usage_pct));
        tags.insert(
            "MemoryPercent".to_string(),
            format!("{:.1}", metrics.memory_usage_pct),
        );
        tags.insert(
            "NetworkKBps".to_string(),
            format!("{:.1}", metrics.network_rate_kbps),
        );
        tags.insert(
            "DiskIOKBps".to_string(),
            format!("{:.1}", metrics.disk_io_rate_kbps),
        );
        tags.insert(
            "InputIdleSecs".to_string(),
            metrics.input_idle_seconds.to_string(),
        );
        let busiest_gpu = metrics
            .gpu_metrics
            .iter()
            .map(|d| d.utilization_pct)
            .fold(0.0_f64, f64::max);
        tags.insert("GpuPercent".to_string(), format!("{:.1}", busiest_gpu));
    }
    tags
}

/// A bound cloud adapter for the instance the daemon runs on.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn id(&self) -> &'static str;

    /// Probe that describe, tag, and stop are authorized.
    async fn verify_permissions(&self) -> Result<(), ProviderError>;

    /// Identity of this instance. Immutable per process lifetime.
    async fn get_instance_info(&self) -> Result<InstanceInfo, ProviderError>;

    /// Tag (when enabled) and request the instance stop.
    async fn stop_instance(&self, reason: &str, metrics: &SystemMetrics)
        -> Result<(), ProviderError>;

    /// Idempotent tag write; the tagging prefix is applied here.
    async fn tag_instance(&self, tags: &TagMap) -> Result<(), ProviderError>;

    /// Read back externally-set control tags, prefix-filtered with the
    /// prefix stripped.
    async fn get_external_tags(&self) -> Result<TagMap, ProviderError>;
}

/// A provider adapter factory with lifecycle state.
#[async_trait]
pub trait ProviderPlugin: Send + Sync {
    fn info(&self) -> PluginInfo;

    /// Validate configuration for this plugin.
    fn init(&self, config: &Config) -> Result<(), ProviderError>;

    fn start(&self) -> Result<(), ProviderError>;
    fn stop(&self) -> Result<(), ProviderError>;
    fn is_running(&self) -> bool;

    /// Whether this plugin supports best-effort host detection.
    fn can_detect(&self) -> bool {
        true
    }

    /// Non-destructive check that the host runs on this provider.
    async fn detect(&self) -> bool;

    /// Build the concrete provider for this host.
    async fn create_provider(&self, config: &Config)
        -> Result<Arc<dyn CloudProvider>, ProviderError>;
}

/// Process-wide plugin registry, ordered by registration.
///
/// Owned by the lifecycle manager and injected where needed; safe under
/// concurrent readers with exclusive writers.
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn ProviderPlugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(Vec::new()),
        }
    }

    /// Registry with the builtin plugins registered in canonical order.
    pub fn builtin() -> Self {
        let registry = Self::new();
        let plugins: [Arc<dyn ProviderPlugin>; 3] = [
            Arc::new(aws::AwsPlugin::new()),
            Arc::new(gcp::GcpPlugin::new()),
            Arc::new(azure::AzurePlugin::new()),
        ];
        for plugin in plugins {
            // Builtin ids are distinct; registration cannot collide.
            let _ = registry.register(plugin);
        }
        registry
    }

    pub fn register(&self, plugin: Arc<dyn ProviderPlugin>) -> Result<(), ProviderError> {
        let mut plugins = self.plugins.write();
        let id = plugin.info().id;
        if plugins.iter().any(|p| p.info().id == id) {
            return Err(ProviderError::AlreadyRegistered(id.to_string()));
        }
        plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderPlugin>> {
        self.plugins.read().iter().find(|p| p.info().id == id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.plugins.read().iter().map(|p| p.info().id).collect()
    }

    /// Ask each detectable plugin in registration order; first match wins.
    pub async fn detect(&self) -> Option<Arc<dyn ProviderPlugin>> {
        let candidates: Vec<Arc<dyn ProviderPlugin>> = self
            .plugins
            .read()
            .iter()
            .filter(|p| p.can_detect())
            .cloned()
            .collect();
        for plugin in candidates {
            if plugin.detect().await {
                return Some(plugin);
            }
        }
        None
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// True when provider detection must be skipped (CI and test runs stay
/// hermetic: no metadata-service probes).
pub fn detection_bypassed() -> bool {
    std::env::var_os("SNOOZE_SKIP_DETECTION").is_some() || std::env::var_os("CI").is_some()
}

/// Resolve the provider for this host: explicit `provider_type` wins, then
/// auto-detection; `None` means local-only mode (stops are suppressed).
pub async fn bind(
    registry: &PluginRegistry,
    config: &Config,
) -> Result<Option<Arc<dyn CloudProvider>>, ProviderError> {
    let plugin = if !config.provider_type.is_empty() {
        Some(
            registry
                .get(&config.provider_type)
                .ok_or_else(|| ProviderError::UnknownProvider(config.provider_type.clone()))?,
        )
    } else if detection_bypassed() {
        tracing::info!("provider detection bypassed, running local-only");
        None
    } else {
        registry.detect().await
    };

    let Some(plugin) = plugin else {
        return Ok(None);
    };

    plugin.init(config)?;
    plugin.start()?;
    let provider = plugin.create_provider(config).await?;
    tracing::info!(provider = provider.id(), "cloud provider bound");
    Ok(Some(provider))
}

/// Shared reqwest client builder with a per-call timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
