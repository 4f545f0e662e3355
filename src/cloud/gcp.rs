// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Google Cloud provider plugin.
//!
//! Identity comes from the GCE metadata server; control-plane calls go to
//! the Compute Engine REST API with the default service account's token.
//! GCE has no instance tags in the AWS sense, so snooze tags are written as
//! instance labels under GCE's restricted character set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    build_stop_tags, http_client, CloudProvider, PluginInfo, ProviderError, ProviderPlugin,
    TagMap, TagSettings, ACTION_TIMEOUT, METADATA_TIMEOUT,
};
use crate::config::Config;
use crate::types::{InstanceInfo, SystemMetrics};

const METADATA_BASE: &str = "http://metadata.google.internal/computeMetadata/v1";
const COMPUTE_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// GCE label keys: max 63 chars of lowercase letters, digits, `-` and `_`.
pub(crate) fn sanitize_label(raw: &str) -> String {
    let mut out: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    out.truncate(63);
    out
}

pub struct GcpPlugin {
    running: AtomicBool,
}

impl GcpPlugin {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }
}

impl Default for GcpPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderPlugin for GcpPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "gcp",
            name: "Google Cloud Platform",
            kind: "cloud-provider",
            version: env!("CARGO_PKG_VERSION"),
            capabilities: &["detect", "tag", "stop", "external-tags"],
        }
    }

    fn init(&self, config: &Config) -> Result<(), ProviderError> {
        config
            .validate()
            .map_err(|e| ProviderError::Metadata(e.to_string()))
    }

    fn start(&self) -> Result<(), ProviderError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), ProviderError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn detect(&self) -> bool {
        match metadata_get("/instance/id").await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "gcp detection negative");
                false
            }
        }
    }

    async fn create_provider(
        &self,
        config: &Config,
    ) -> Result<Arc<dyn CloudProvider>, ProviderError> {
        let provider = GcpProvider::bind(TagSettings::from(config)).await?;
        Ok(Arc::new(provider))
    }
}

#[derive(serde::Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(serde::Deserialize, Default)]
struct GceInstance {
    #[serde(rename = "creationTimestamp", default)]
    creation_timestamp: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(rename = "labelFingerprint", default)]
    label_fingerprint: String,
}

pub struct GcpProvider {
    tags: TagSettings,
    info: InstanceInfo,
    project: String,
    zone: String,
    name: String,
}

impl GcpProvider {
    pub async fn bind(tags: TagSettings) -> Result<Self, ProviderError> {
        let id = metadata_get("/instance/id").await?;
        let name = metadata_get("/instance/name").await?;
        let project = metadata_get("/project/project-id").await?;
        let zone = last_segment(&metadata_get("/instance/zone").await?);
        let machine_type = last_segment(&metadata_get("/instance/machine-type").await?);
        // Region is the zone minus its trailing zone letter.
        let region = zone.rsplit_once('-').map(|(r, _)| r.to_string()).unwrap_or_default();

        let mut provider = Self {
            tags,
            info: InstanceInfo {
                id,
                instance_type: machine_type,
                region,
                provider: "gcp".to_string(),
                launch_time: String::new(),
                tags: Default::default(),
            },
            project,
            zone,
            name,
        };

        match provider.fetch_instance().await {
            Ok(instance) => {
                provider.info.launch_time = instance.creation_timestamp;
                provider.info.tags = instance.labels;
            }
            Err(e) => tracing::debug!(error = %e, "initial instance read unavailable"),
        }
        Ok(provider)
    }

    fn instance_url(&self) -> String {
        format!(
            "{}/projects/{}/zones/{}/instances/{}",
            COMPUTE_BASE, self.project, self.zone, self.name
        )
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}-{}", sanitize_label(&self.tags.prefix), sanitize_label(key))
    }

    async fn fetch_instance(&self) -> Result<GceInstance, ProviderError> {
        let token = access_token().await?;
        let client = http_client(ACTION_TIMEOUT)?;
        let response = client
            .get(self.instance_url())
            .bearer_auth(&token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(gcp_error(status, &response.text().await.unwrap_or_default()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CloudProvider for GcpProvider {
    fn id(&self) -> &'static str {
        "gcp"
    }

    async fn verify_permissions(&self) -> Result<(), ProviderError> {
        // compute.instances.get under the bound service account. Label and
        // stop rights ride on the same role in practice.
        self.fetch_instance().await.map(|_| ())
    }

    async fn get_instance_info(&self) -> Result<InstanceInfo, ProviderError> {
        Ok(self.info.clone())
    }

    async fn stop_instance(
        &self,
        reason: &str,
        metrics: &SystemMetrics,
    ) -> Result<(), ProviderError> {
        if self.tags.enabled {
            let tags = build_stop_tags(&self.tags, reason, metrics, Utc::now());
            self.tag_instance(&tags).await?;
        }

        let token = access_token().await?;
        let client = http_client(ACTION_TIMEOUT)?;
        let response = client
            .post(format!("{}/stop", self.instance_url()))
            .bearer_auth(&token)
            .header("content-length", "0")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(gcp_error(status, &response.text().await.unwrap_or_default()));
        }
        tracing::info!(instance = %self.name, "stop requested");
        Ok(())
    }

    async fn tag_instance(&self, tags: &TagMap) -> Result<(), ProviderError> {
        if tags.is_empty() {
            return Ok(());
        }
        // setLabels replaces the whole label map, so merge over the current
        // labels under the fingerprint for optimistic concurrency.
        let current = self.fetch_instance().await?;
        let mut labels = current.labels;
        for (key, value) in tags {
            labels.insert(self.full_key(key), sanitize_label(value));
        }

        let token = access_token().await?;
        let client = http_client(ACTION_TIMEOUT)?;
        let response = client
            .post(format!("{}/setLabels", self.instance_url()))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "labels": labels,
                "labelFingerprint": current.label_fingerprint,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(gcp_error(status, &response.text().await.unwrap_or_default()));
        }
        Ok(())
    }

    async fn get_external_tags(&self) -> Result<TagMap, ProviderError> {
        let prefix = format!("{}-", sanitize_label(&self.tags.prefix));
        Ok(self
            .fetch_instance()
            .await?
            .labels
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix).map(|bare| (bare.to_string(), value))
            })
            .collect())
    }
}

fn gcp_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
        return ProviderError::Permission(body.chars().take(200).collect());
    }
    ProviderError::Api {
        provider: "gcp",
        message: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
    }
}

fn last_segment(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

async fn metadata_get(path: &str) -> Result<String, ProviderError> {
    let client = http_client(METADATA_TIMEOUT)?;
    let response = client
        .get(format!("{}{}", METADATA_BASE, path))
        .header("Metadata-Flavor", "Google")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProviderError::Metadata(format!(
            "metadata {} returned {}",
            path,
            response.status()
        )));
    }
    Ok(response.text().await?.trim().to_string())
}

async fn access_token() -> Result<String, ProviderError> {
    let client = http_client(METADATA_TIMEOUT)?;
    let response = client
        .get(format!(
            "{}/instance/service-accounts/default/token",
            METADATA_BASE
        ))
        .header("Metadata-Flavor", "Google")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProviderError::Metadata(format!(
            "token endpoint returned {}",
            response.status()
        )));
    }
    let token: AccessToken = response.json().await?;
    Ok(token.access_token)
}
