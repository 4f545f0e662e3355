// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! AWS provider plugin.
//!
//! Identity comes from IMDSv2 (token-authenticated metadata); control-plane
//! calls go to the EC2 query API signed with SigV4 using the instance-role
//! credentials. Stop semantics: `StopInstances` with this instance's id,
//! success judged by HTTP status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use super::sigv4::{self, Credentials, SigningRequest};
use super::{
    build_stop_tags, http_client, CloudProvider, PluginInfo, ProviderError, ProviderPlugin,
    TagMap, TagSettings, ACTION_TIMEOUT, METADATA_TIMEOUT,
};
use crate::config::Config;
use crate::types::{InstanceInfo, SystemMetrics};

const IMDS_BASE: &str = "http://169.254.169.254";
const EC2_API_VERSION: &str = "2016-11-15";
const TOKEN_TTL_SECS: &str = "21600";

pub struct AwsPlugin {
    running: AtomicBool,
}

impl AwsPlugin {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }
}

impl Default for AwsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderPlugin for AwsPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "aws",
            name: "Amazon Web Services",
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
        match imds_token().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "aws detection negative");
                false
            }
        }
    }

    async fn create_provider(
        &self,
        config: &Config,
    ) -> Result<Arc<dyn CloudProvider>, ProviderError> {
        let provider = AwsProvider::bind(TagSettings::from(config)).await?;
        Ok(Arc::new(provider))
    }
}

/// Instance-identity document fields we consume.
#[derive(serde::Deserialize)]
struct IdentityDocument {
    #[serde(rename = "instanceId")]
    instance_id: String,
    #[serde(rename = "instanceType")]
    instance_type: String,
    region: String,
    #[serde(rename = "pendingTime", default)]
    pending_time: String,
}

/// Role credentials as served by IMDS.
#[derive(serde::Deserialize)]
struct RoleCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "Token")]
    token: String,
}

pub struct AwsProvider {
    tags: TagSettings,
    info: InstanceInfo,
}

impl AwsProvider {
    /// Resolve identity from IMDS and build the provider.
    pub async fn bind(tags: TagSettings) -> Result<Self, ProviderError> {
        let token = imds_token().await?;
        let doc = imds_get(&token, "/latest/dynamic/instance-identity/document").await?;
        let doc: IdentityDocument = serde_json::from_str(&doc)
            .map_err(|e| ProviderError::Metadata(format!("identity document: {}", e)))?;

        let mut provider = Self {
            tags,
            info: InstanceInfo {
                id: doc.instance_id,
                instance_type: doc.instance_type,
                region: doc.region,
                provider: "aws".to_string(),
                launch_time: doc.pending_time,
                tags: Default::default(),
            },
        };

        // Tag inventory is best-effort at bind time; live reads go through
        // get_external_tags.
        match provider.describe_tags().await {
            Ok(all) => provider.info.tags = all,
            Err(e) => tracing::debug!(error = %e, "initial tag inventory unavailable"),
        }
        Ok(provider)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}/{}", self.tags.prefix, key)
    }

    /// Signed EC2 query-API call. Returns (status, body).
    async fn ec2_call(
        &self,
        params: Vec<(String, String)>,
    ) -> Result<(reqwest::StatusCode, String), ProviderError> {
        let creds = role_credentials().await?;
        let host = format!("ec2.{}.amazonaws.com", self.info.region);
        let body = sigv4::form_encode(&params);
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let content_type = "application/x-www-form-urlencoded; charset=utf-8";

        let authorization = sigv4::authorization_header(
            &creds,
            &SigningRequest {
                method: "POST",
                uri: "/",
                query: "",
                host: &host,
                content_type,
                amz_date: &amz_date,
                region: &self.info.region,
                service: "ec2",
                body: body.as_bytes(),
            },
        );

        let client = http_client(ACTION_TIMEOUT)?;
        let mut request = client
            .post(format!("https://{}/", host))
            .header("content-type", content_type)
            .header("x-amz-date", amz_date)
            .header("authorization", authorization);
        if let Some(token) = &creds.session_token {
            request = request.header("x-amz-security-token", token.clone());
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// All tags on this instance, bare provider keys.
    async fn describe_tags(&self) -> Result<TagMap, ProviderError> {
        let (status, body) = self
            .ec2_call(vec![
                ("Action".to_string(), "DescribeTags".to_string()),
                ("Version".to_string(), EC2_API_VERSION.to_string()),
                ("Filter.1.Name".to_string(), "resource-id".to_string()),
                ("Filter.1.Value.1".to_string(), self.info.id.clone()),
            ])
            .await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(parse_describe_tags(&body))
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn id(&self) -> &'static str {
        "aws"
    }

    async fn verify_permissions(&self) -> Result<(), ProviderError> {
        // DryRun separates "authorized" (DryRunOperation) from
        // "denied" (UnauthorizedOperation) without side effects.
        let (status, body) = self
            .ec2_call(vec![
                ("Action".to_string(), "StopInstances".to_string()),
                ("Version".to_string(), EC2_API_VERSION.to_string()),
                ("InstanceId.1".to_string(), self.info.id.clone()),
                ("DryRun".to_string(), "true".to_string()),
            ])
            .await?;

        if body.contains("DryRunOperation") {
            return Ok(());
        }
        if body.contains("UnauthorizedOperation") {
            return Err(ProviderError::Permission(
                "ec2:StopInstances denied for this role".to_string(),
            ));
        }
        if status.is_success() {
            // A non-dry-run success here would be a contract violation;
            // report it rather than pretending the probe passed.
            return Err(ProviderError::Api {
                provider: "aws",
                message: "DryRun probe unexpectedly executed".to_string(),
            });
        }
        Err(api_error(status, &body))
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

        let (status, body) = self
            .ec2_call(vec![
                ("Action".to_string(), "StopInstances".to_string()),
                ("Version".to_string(), EC2_API_VERSION.to_string()),
                ("InstanceId.1".to_string(), self.info.id.clone()),
            ])
            .await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        tracing::info!(instance = %self.info.id, "stop requested");
        Ok(())
    }

    async fn tag_instance(&self, tags: &TagMap) -> Result<(), ProviderError> {
        if tags.is_empty() {
            return Ok(());
        }
        let mut params = vec![
            ("Action".to_string(), "CreateTags".to_string()),
            ("Version".to_string(), EC2_API_VERSION.to_string()),
            ("ResourceId.1".to_string(), self.info.id.clone()),
        ];
        for (i, (key, value)) in tags.iter().enumerate() {
            params.push((format!("Tag.{}.Key", i + 1), self.full_key(key)));
            params.push((format!("Tag.{}.Value", i + 1), value.clone()));
        }

        let (status, body) = self.ec2_call(params).await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(())
    }

    async fn get_external_tags(&self) -> Result<TagMap, ProviderError> {
        let prefix = format!("{}/", self.tags.prefix);
        Ok(self
            .describe_tags()
            .await?
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix).map(|bare| (bare.to_string(), value))
            })
            .collect())
    }
}

fn api_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    if status == reqwest::StatusCode::FORBIDDEN || body.contains("UnauthorizedOperation") {
        return ProviderError::Permission(truncate(body, 200));
    }
    ProviderError::Api {
        provider: "aws",
        message: format!("HTTP {}: {}", status, truncate(body, 200)),
    }
}

fn truncate(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if out.len() < s.len() {
        out.push_str("...");
    }
    out
}

/// Extract key/value pairs from a DescribeTags XML response.
fn parse_describe_tags(xml: &str) -> TagMap {
    let item_re = item_regex();
    let mut tags = TagMap::new();
    for item in item_re.captures_iter(xml) {
        let body = &item[1];
        let key = capture_tag(body, "key");
        let value = capture_tag(body, "value").unwrap_or_default();
        if let Some(key) = key {
            tags.insert(key, value);
        }
    }
    tags
}

fn item_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<item>(.*?)</item>")
            .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

fn capture_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}

async fn imds_token() -> Result<String, ProviderError> {
    let client = http_client(METADATA_TIMEOUT)?;
    let response = client
        .put(format!("{}/latest/api/token", IMDS_BASE))
        .header("X-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECS)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProviderError::Metadata(format!(
            "IMDSv2 token request returned {}",
            response.status()
        )));
    }
    Ok(response.text().await?)
}

async fn imds_get(token: &str, path: &str) -> Result<String, ProviderError> {
    let client = http_client(METADATA_TIMEOUT)?;
    let response = client
        .get(format!("{}{}", IMDS_BASE, path))
        .header("X-aws-ec2-metadata-token", token)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProviderError::Metadata(format!(
            "IMDS {} returned {}",
            path,
            response.status()
        )));
    }
    Ok(response.text().await?)
}

async fn role_credentials() -> Result<Credentials, ProviderError> {
    let token = imds_token().await?;
    let role = imds_get(&token, "/latest/meta-data/iam/security-credentials/").await?;
    let role = role.lines().next().unwrap_or("").trim().to_string();
    if role.is_empty() {
        return Err(ProviderError::Metadata(
            "no IAM role attached to this instance".to_string(),
        ));
    }

    let raw = imds_get(
        &token,
        &format!("/latest/meta-data/iam/security-credentials/{}", role),
    )
    .await?;
    let creds: RoleCredentials = serde_json::from_str(&raw)
        .map_err(|e| ProviderError::Metadata(format!("role credentials: {}", e)))?;
    Ok(Credentials {
        access_key_id: creds.access_key_id,
        secret_access_key: creds.secret_access_key,
        session_token: Some(creds.token),
    })
}
