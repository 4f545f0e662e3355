//! CloudSnooze - a host-resident agent that stops idle cloud instances.
//!
//! The daemon watches resource utilization and, once the machine has been
//! continuously idle for the configured *naptime*, asks the cloud provider
//! to stop the instance. A control CLI talks to the daemon over a local
//! stream socket.
//!
//! # Architecture
//!
//! - **monitor**: per-resource probes merged into one snapshot per tick
//! - **engine**: composite idle evaluator + naptime state machine
//! - **cloud**: provider plugins (AWS, GCP, Azure) behind one contract
//! - **daemon**: the periodic control loop driving all of the above
//! - **ipc**: line-oriented JSON protocol on a Unix socket
//! - **config / history / shutdown / telemetry**: lifecycle plumbing
//!
//! Failure posture: the engine is fail-closed against sleeping. A broken
//! sensor, a missing first sample, or an unreadable GPU tool all mean
//! "not idle"; the daemon never stops an instance on bad data.

pub mod cli;
pub mod cloud;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod history;
pub mod ipc;
pub mod monitor;
pub mod shutdown;
pub mod telemetry;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use cloud::PluginRegistry;
use config::{Config, ConfigError, SharedConfig};
use daemon::ControlLoop;
use history::HistoryStore;
use ipc::RequestHandler;
use monitor::SystemSampler;
use shutdown::ShutdownCoordinator;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("provider error: {0}")]
    Provider(#[from] cloud::ProviderError),
}

/// Assembled daemon: lifecycle-owned state plus the control loop.
pub struct Daemon {
    pub config: SharedConfig,
    pub history: Arc<HistoryStore>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub handler: Arc<RequestHandler>,
    pub control: ControlLoop,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

impl Daemon {
    /// Load config, bind the provider, and wire the components together.
    ///
    /// An explicitly configured provider that fails to bind is fatal; a
    /// failed auto-detection just means local-only mode.
    pub async fn bootstrap(config_path: PathBuf) -> Result<Self, BootstrapError> {
        let config = Config::load(&config_path)?;
        let shared = SharedConfig::new(config.clone(), config_path);

        let registry = PluginRegistry::builtin();
        let provider = match cloud::bind(&registry, &config).await {
            Ok(provider) => provider,
            Err(e) if config.provider_type.is_empty() => {
                tracing::warn!(error = %e, "provider binding failed, running local-only");
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(provider) = &provider {
            match provider.get_instance_info().await {
                Ok(info) => tracing::info!(
                    instance = %info.id,
                    instance_type = %info.instance_type,
                    region = %info.region,
                    "instance identity resolved"
                ),
                Err(e) => tracing::warn!(error = %e, "instance identity unavailable"),
            }
            match provider.verify_permissions().await {
                Ok(()) => tracing::info!("provider permissions verified"),
                Err(e) => tracing::warn!(error = %e, "provider permission check failed"),
            }
        } else {
            tracing::info!("no provider bound, stop requests will be suppressed");
        }

        let history = Arc::new(HistoryStore::new());
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let control = ControlLoop::new(
            shared.clone(),
            Box::new(SystemSampler::new()),
            provider,
            Arc::clone(&history),
        );
        let handler = Arc::new(RequestHandler::new(
            shared.clone(),
            control.status_cell(),
            Arc::clone(&history),
            Arc::clone(&shutdown),
        ));

        Ok(Self {
            config: shared,
            history,
            shutdown,
            handler,
            control,
        })
    }
}
