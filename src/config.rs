// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration: load, persist, and single-key updates.
//!
//! The config file is JSON. Missing file at startup means "first run": the
//! defaults are written out and the daemon continues. Unknown keys are
//! preserved across load/save so foreign tooling can stash its own settings
//! in the same file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/snooze/snooze.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown config key: {0}")]
    InvalidKey(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Versioned runtime configuration (see the config file reference docs for
/// the effect of each key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub check_interval_seconds: u64,
    pub naptime_minutes: u64,
    pub cpu_threshold_percent: f64,
    pub memory_threshold_percent: f64,
    pub network_threshold_kbps: f64,
    pub disk_io_threshold_kbps: f64,
    pub input_idle_threshold_secs: u64,
    pub gpu_monitoring_enabled: bool,
    pub gpu_threshold_percent: f64,
    /// Explicit provider id; empty means auto-detect.
    pub provider_type: String,
    pub enable_instance_tags: bool,
    pub tagging_prefix: String,
    pub detailed_instance_tags: bool,
    pub tag_polling_enabled: bool,
    pub tag_polling_interval_secs: u64,

    /// Unrecognized keys, preserved on round-trip.
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_seconds: 60,
            naptime_minutes: 30,
            cpu_threshold_percent: 10.0,
            memory_threshold_percent: 30.0,
            network_threshold_kbps: 50.0,
            disk_io_threshold_kbps: 100.0,
            input_idle_threshold_secs: 900,
            gpu_monitoring_enabled: true,
            gpu_threshold_percent: 5.0,
            provider_type: String::new(),
            enable_instance_tags: true,
            tagging_prefix: "CloudSnooze".to_string(),
            detailed_instance_tags: true,
            tag_polling_enabled: true,
            tag_polling_interval_secs: 60,
            extras: serde_json::Map::new(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file writes defaults and continues; an
    /// unparseable file is a startup-fatal error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = serde_json::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Config::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Naptime expressed in seconds.
    pub fn naptime_seconds(&self) -> u64 {
        self.naptime_minutes * 60
    }

    /// Update one key with type coercion. String values are parsed into the
    /// key's native type so `CONFIG_SET {name, value}` can carry either
    /// `"50"` or `50`.
    pub fn set_key(&mut self, name: &str, value: &serde_json::Value) -> Result<(), ConfigError> {
        match name {
            "check_interval_seconds" => self.check_interval_seconds = coerce_u64(name, value)?,
            "naptime_minutes" => self.naptime_minutes = coerce_u64(name, value)?,
            "cpu_threshold_percent" => self.cpu_threshold_percent = coerce_f64(name, value)?,
            "memory_threshold_percent" => self.memory_threshold_percent = coerce_f64(name, value)?,
            "network_threshold_kbps" => self.network_threshold_kbps = coerce_f64(name, value)?,
            "disk_io_threshold_kbps" => self.disk_io_threshold_kbps = coerce_f64(name, value)?,
            "input_idle_threshold_secs" => self.input_idle_threshold_secs = coerce_u64(name, value)?,
            "gpu_monitoring_enabled" => self.gpu_monitoring_enabled = coerce_bool(name, value)?,
            "gpu_threshold_percent" => self.gpu_threshold_percent = coerce_f64(name, value)?,
            "provider_type" => self.provider_type = coerce_string(name, value)?,
            "enable_instance_tags" => self.enable_instance_tags = coerce_bool(name, value)?,
            "tagging_prefix" => self.tagging_prefix = coerce_string(name, value)?,
            "detailed_instance_tags" => self.detailed_instance_tags = coerce_bool(name, value)?,
            "tag_polling_enabled" => self.tag_polling_enabled = coerce_bool(name, value)?,
            "tag_polling_interval_secs" => self.tag_polling_interval_secs = coerce_u64(name, value)?,
            other => return Err(ConfigError::InvalidKey(other.to_string())),
        }
        self.validate()
    }

    /// Range checks shared by load and set_key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pct = |key: &str, v: f64| -> Result<(), ConfigError> {
            if !(0.0..=100.0).contains(&v) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{} is outside 0-100", v),
                });
            }
            Ok(())
        };
        pct("cpu_threshold_percent", self.cpu_threshold_percent)?;
        pct("memory_threshold_percent", self.memory_threshold_percent)?;
        pct("gpu_threshold_percent", self.gpu_threshold_percent)?;

        let nonneg = |key: &str, v: f64| -> Result<(), ConfigError> {
            if v < 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{} is negative", v),
                });
            }
            Ok(())
        };
        nonneg("network_threshold_kbps", self.network_threshold_kbps)?;
        nonneg("disk_io_threshold_kbps", self.disk_io_threshold_kbps)?;

        if self.check_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "check_interval_seconds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.naptime_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "naptime_minutes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.tag_polling_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tag_polling_interval_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.tagging_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "tagging_prefix".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn coerce_f64(key: &str, value: &serde_json::Value) -> Result<f64, ConfigError> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| invalid(key, value)),
        serde_json::Value::String(s) => s.trim().parse().map_err(|_| invalid(key, value)),
        _ => Err(invalid(key, value)),
    }
}

fn coerce_u64(key: &str, value: &serde_json::Value) -> Result<u64, ConfigError> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(|| invalid(key, value)),
        serde_json::Value::String(s) => s.trim().parse().map_err(|_| invalid(key, value)),
        _ => Err(invalid(key, value)),
    }
}

fn coerce_bool(key: &str, value: &serde_json::Value) -> Result<bool, ConfigError> {
    match value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::String(s) => match s.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(invalid(key, value)),
        },
        _ => Err(invalid(key, value)),
    }
}

fn coerce_string(key: &str, value: &serde_json::Value) -> Result<String, ConfigError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &serde_json::Value) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot coerce {}", value),
    }
}

/// Handle to the lifecycle-owned configuration.
///
/// Readers take whole-struct snapshots; writers swap the whole structure
/// under the write lock and persist before committing, so a failed persist
/// never leaves memory and disk disagreeing.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl SharedConfig {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Current configuration as a value object.
    pub fn snapshot(&self) -> Config {
        self.inner.read().clone()
    }

    /// Apply a single-key update and persist it.
    pub fn update_key(&self, name: &str, value: &serde_json::Value) -> Result<(), ConfigError> {
        let mut updated = self.inner.read().clone();
        updated.set_key(name, value)?;
        updated.save(&self.path)?;
        *self.inner.write() = updated;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
