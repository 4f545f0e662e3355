// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Microsoft Azure provider plugin.
//!
//! Identity comes from the Azure Instance Metadata Service; control-plane
//! calls go to Azure Resource Manager with a managed-identity token. Stop
//! means `deallocate` (a stopped-but-allocated VM still bills). Azure tag
//! names reject `/`, so the prefix separator is `:`.

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

const IMDS_INSTANCE: &str =
    "http://169.254.169.254/metadata/instance?api-version=2021-02-01";
const IMDS_TOKEN: &str = "http://169.254.169.254/metadata/identity/oauth2/token\
?api-version=2018-02-01&resource=https%3A%2F%2Fmanagement.azure.com%2F";
const ARM_BASE: &str = "https://management.azure.com";
const TAGS_API_VERSION: &str = "2021-04-01";
const COMPUTE_API_VERSION: &str = "2023-07-01";

pub struct AzurePlugin {
    running: AtomicBool,
}

impl AzurePlugin {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }
}

impl Default for AzurePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderPlugin for AzurePlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "azure",
            name: "Microsoft Azure",
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
        match instance_metadata().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "azure detection negative");
                false
            }
        }
    }

    async fn create_provider(
        &self,
        config: &Config,
    ) -> Result<Arc<dyn CloudProvider>, ProviderError> {
        let provider = AzureProvider::bind(TagSettings::from(config)).await?;
        Ok(Arc::new(provider))
    }
}

#[derive(serde::Deserialize)]
struct ImdsResponse {
    compute: ImdsCompute,
}

#[derive(serde::Deserialize)]
struct ImdsCompute {
    #[serde(rename = "vmId")]
    vm_id: String,
    #[serde(rename = "vmSize")]
    vm_size: String,
    location: String,
    name: String,
    #[serde(rename = "resourceGroupName")]
    resource_group: String,
    #[serde(rename = "subscriptionId")]
    subscription_id: String,
    #[serde(rename = "tagsList", default)]
    tags_list: Vec<ImdsTag>,
}

#[derive(serde::Deserialize)]
struct ImdsTag {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(serde::Deserialize)]
struct AccessToken {
    access_token: String,
}

pub struct AzureProvider {
    tags: TagSettings,
    info: InstanceInfo,
    /// ARM resource id of this VM.
    resource_id: String,
}

impl AzureProvider {
    pub async fn bind(tags: TagSettings) -> Result<Self, ProviderError> {
        let metadata = instance_metadata().await?;
        let compute = metadata.compute;
        let resource_id = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
            compute.subscription_id, compute.resource_group, compute.name
        );

        Ok(Self {
            tags,
            info: InstanceInfo {
                id: compute.vm_id,
                instance_type: compute.vm_size,
                region: compute.location,
                provider: "azure".to_string(),
                launch_time: String::new(),
                tags: compute
                    .tags_list
                    .into_iter()
                    .map(|t| (t.name, t.value))
                    .collect(),
            },
            resource_id,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.tags.prefix, key)
    }

    fn tags_url(&self) -> String {
        format!(
            "{}{}/providers/Microsoft.Resources/tags/default?api-version={}",
            ARM_BASE, self.resource_id, TAGS_API_VERSION
        )
    }

    async fn read_tags(&self) -> Result<TagMap, ProviderError> {
        let token = access_token().await?;
        let client = http_client(ACTION_TIMEOUT)?;
        let response = client
            .get(self.tags_url())
            .bearer_auth(&token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(azure_error(status, &response.text().await.unwrap_or_default()));
        }
        let body: serde_json::Value = response.json().await?;
        let mut tags = TagMap::new();
        if let Some(map) = body
            .get("properties")
            .and_then(|p| p.get("tags"))
            .and_then(|t| t.as_object())
        {
            for (key, value) in map {
                tags.insert(key.clone(), value.as_str().unwrap_or_default().to_string());
            }
        }
        Ok(tags)
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn id(&self) -> &'static str {
        "azure"
    }

    async fn verify_permissions(&self) -> Result<(), ProviderError> {
        // Reading the VM resource exercises the managed identity against
        // ARM; 401/403 surface as permission errors.
        let token = access_token().await?;
        let client = http_client(ACTION_TIMEOUT)?;
        let response = client
            .get(format!(
                "{}{}?api-version={}",
                ARM_BASE, self.resource_id, COMPUTE_API_VERSION
            ))
            .bearer_auth(&token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(azure_error(status, &response.text().await.unwrap_or_default()));
        }
        Ok(())
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
            .post(format!(
                "{}{}/deallocate?api-version={}",
                ARM_BASE, self.resource_id, COMPUTE_API_VERSION
            ))
            .bearer_auth(&token)
            .header("content-length", "0")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(azure_error(status, &response.text().await.unwrap_or_default()));
        }
        tracing::info!(instance = %self.info.id, "deallocate requested");
        Ok(())
    }

    async fn tag_instance(&self, tags: &TagMap) -> Result<(), ProviderError> {
        if tags.is_empty() {
            return Ok(());
        }
        let merged: serde_json::Map<String, serde_json::Value> = tags
            .iter()
            .map(|(key, value)| {
                (
                    self.full_key(key),
                    serde_json::Value::String(value.clone()),
                )
            })
            .collect();

        let token = access_token().await?;
        let client = http_client(ACTION_TIMEOUT)?;
        let response = client
            .patch(self.tags_url())
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "operation": "Merge",
                "properties": { "tags": merged },
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(azure_error(status, &response.text().await.unwrap_or_default()));
        }
        Ok(())
    }

    async fn get_external_tags(&self) -> Result<TagMap, ProviderError> {
        let prefix = format!("{}:", self.tags.prefix);
        Ok(self
            .read_tags()
            .await?
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix).map(|bare| (bare.to_string(), value))
            })
            .collect())
    }
}

fn azure_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
        return ProviderError::Permission(body.chars().take(200).collect());
    }
    ProviderError::Api {
        provider: "azure",
        message: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
    }
}

async fn instance_metadata() -> Result<ImdsResponse, ProviderError> {
    let client = http_client(METADATA_TIMEOUT)?;
    let response = client
        .get(IMDS_INSTANCE)
        .header("Metadata", "true")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProviderError::Metadata(format!(
            "Azure IMDS returned {}",
            response.status()
        )));
    }
    Ok(response.json().await?)
}

async fn access_token() -> Result<String, ProviderError> {
    let client = http_client(METADATA_TIMEOUT)?;
    let response = client
        .get(IMDS_TOKEN)
        .header("Metadata", "true")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProviderError::Metadata(format!(
            "managed identity token endpoint returned {}",
            response.status()
        )));
    }
    let token: AccessToken = response.json().await?;
    Ok(token.access_token)
}
