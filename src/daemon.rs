// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! The control loop: periodic driver of sampling, decisions, and stops.
//!
//! One long-lived task owns the engine. Each tick samples the sources,
//! advances the state machine, reacts to the verdict, and publishes an
//! atomic status snapshot for the socket server. Tag polling runs on its
//! own cadence inside the same task, so engine state never needs a lock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::cloud::CloudProvider;
use crate::config::SharedConfig;
use crate::engine::{Decision, DecisionEngine};
use crate::history::HistoryStore;
use crate::monitor::{MetricsSample, Sampler};
use crate::telemetry;
use crate::types::{SnoozeEvent, SystemMetrics, Verdict};

/// State surface the socket server reads. Replaced wholesale under the
/// write lock once per tick, so a reader always sees one tick's view.
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub metrics: Option<SystemMetrics>,
    pub idle_since: Option<u64>,
    pub verdict: Verdict,
    pub reason: String,
    pub paused: bool,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            metrics: None,
            idle_since: None,
            verdict: Verdict::Awake,
            reason: String::new(),
            paused: false,
        }
    }
}

pub type StatusCell = Arc<RwLock<DaemonStatus>>;

/// Current epoch seconds.
pub fn now_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub struct ControlLoop {
    config: SharedConfig,
    sampler: Box<dyn Sampler>,
    engine: DecisionEngine,
    provider: Option<Arc<dyn CloudProvider>>,
    history: Arc<HistoryStore>,
    status: StatusCell,
    last_tag_poll: Option<u64>,
}

impl ControlLoop {
    pub fn new(
        config: SharedConfig,
        sampler: Box<dyn Sampler>,
        provider: Option<Arc<dyn CloudProvider>>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            config,
            sampler,
            engine: DecisionEngine::new(),
            provider,
            history,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            last_tag_poll: None,
        }
    }

    /// Handle for the socket server's STATUS reads.
    pub fn status_cell(&self) -> StatusCell {
        Arc::clone(&self.status)
    }

    /// One tick at time `now`. Public so tests can drive the loop without
    /// timers.
    pub async fn tick(&mut self, now: u64) {
        telemetry::record_tick();
        let config = self.config.snapshot();

        // Poll first so a freshly-set pause tag applies to this tick.
        if config.tag_polling_enabled {
            self.maybe_poll_tags(now, config.tag_polling_interval_secs).await;
        }

        let sample = self.sampler.sample(&config, now).await;
        let decision = self.engine.advance(&sample, &config, now);
        let idle_since = self.engine.state().idle_since;
        tracing::debug!(verdict = %decision.verdict, reason = %decision.reason, "tick");

        if decision.verdict == Verdict::ShouldSnooze {
            self.execute_stop(&decision, &sample, now).await;
        }

        // Publish this tick's decision, not the post-stop reset state, so
        // STATUS reflects what the engine concluded at this tick.
        *self.status.write() = DaemonStatus {
            metrics: Some(sample.metrics.clone()),
            idle_since,
            verdict: decision.verdict,
            reason: decision.reason,
            paused: self.engine.is_paused(),
        };
    }

    /// Run until cancelled, ticking every `check_interval_seconds`. The
    /// interval is re-read each iteration so config updates take effect at
    /// the next tick boundary.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            self.tick(now_epoch()).await;

            let interval = Duration::from_secs(self.config.snapshot().check_interval_seconds);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("control loop: shutdown signal received");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn execute_stop(&mut self, decision: &Decision, sample: &MetricsSample, now: u64) {
        match self.provider.clone() {
            Some(provider) => {
                telemetry::record_stop_request(provider.id());
                match provider.stop_instance(&decision.reason, &sample.metrics).await {
                    Ok(()) => {
                        let instance_id = provider
                            .get_instance_info()
                            .await
                            .map(|info| info.id)
                            .unwrap_or_default();
                        self.history.record(SnoozeEvent {
                            timestamp: now,
                            reason: decision.reason.clone(),
                            metrics_snapshot: sample.metrics.clone(),
                            instance_id,
                        });
                        self.engine.reset();
                    }
                    Err(e) => {
                        // Engine state stays put: the next tick re-evaluates
                        // and the retry rides the sample period.
                        telemetry::record_stop_failure(provider.id());
                        tracing::error!(error = %e, "stop_instance failed");
                    }
                }
            }
            None => {
                tracing::info!(reason = %decision.reason, "local-only mode, would stop instance");
                self.history.record(SnoozeEvent {
                    timestamp: now,
                    reason: decision.reason.clone(),
                    metrics_snapshot: sample.metrics.clone(),
                    instance_id: String::new(),
                });
                self.engine.reset();
            }
        }
    }

    async fn maybe_poll_tags(&mut self, now: u64, interval_secs: u64) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let due = self
            .last_tag_poll
            .map_or(true, |last| now.saturating_sub(last) >= interval_secs);
        if !due {
            return;
        }
        self.last_tag_poll = Some(now);
        telemetry::record_tag_poll(provider.id());

        match provider.get_external_tags().await {
            Ok(tags) => {
                let paused = tags.iter().any(|(key, value)| {
                    key.eq_ignore_ascii_case("pause") && value.eq_ignore_ascii_case("true")
                });
                self.engine.set_paused(paused);
            }
            Err(e) => {
                // Pause state is left as-is; a flaky tag read must not
                // silently unpause the daemon.
                tracing::warn!(error = %e, "external tag poll failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::cloud::{ProviderError, TagMap};
    use crate::config::Config;
    use crate::types::{Criterion, InstanceInfo};

    fn idle_metrics() -> SystemMetrics {
        SystemMetrics {
            cpu_usage_pct: 1.0,
            memory_usage_pct: 5.0,
            network_rate_kbps: 0.0,
            disk_io_rate_kbps: 0.0,
            input_idle_seconds: 1000,
            gpu_metrics: Vec::new(),
            collection_time: 0,
        }
    }

    /// Sampler that replays a scripted sequence, repeating the last entry.
    pub struct ScriptedSampler {
        samples: Vec<MetricsSample>,
        cursor: usize,
    }

    impl ScriptedSampler {
        pub fn new(samples: Vec<MetricsSample>) -> Self {
            Self { samples, cursor: 0 }
        }

        pub fn always_idle() -> Self {
            Self::new(vec![MetricsSample {
                metrics: idle_metrics(),
                missing: Vec::new(),
            }])
        }
    }

    #[async_trait]
    impl Sampler for ScriptedSampler {
        async fn sample(&mut self, _config: &Config, now: u64) -> MetricsSample {
            let index = self.cursor.min(self.samples.len() - 1);
            self.cursor += 1;
            let mut sample = self.samples[index].clone();
            sample.metrics.collection_time = now;
            sample
        }
    }

    /// Provider double counting stop/tag calls.
    pub struct MockProvider {
        pub stops: AtomicUsize,
        pub fail_stops: bool,
        pub external_tags: Mutex<TagMap>,
    }

    impl MockProvider {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                stops: AtomicUsize::new(0),
                fail_stops: false,
                external_tags: Mutex::new(TagMap::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                stops: AtomicUsize::new(0),
                fail_stops: true,
                external_tags: Mutex::new(TagMap::new()),
            })
        }
    }

    #[async_trait]
    impl CloudProvider for MockProvider {
        fn id(&self) -> &'static str {
            "mock"
        }

        async fn verify_permissions(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn get_instance_info(&self) -> Result<InstanceInfo, ProviderError> {
            Ok(InstanceInfo {
                id: "i-mock".into(),
                instance_type: "t3.micro".into(),
                region: "us-east-1".into(),
                provider: "mock".into(),
                launch_time: String::new(),
                tags: Default::default(),
            })
        }

        async fn stop_instance(
            &self,
            _reason: &str,
            _metrics: &SystemMetrics,
        ) -> Result<(), ProviderError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stops {
                return Err(ProviderError::Api {
                    provider: "mock",
                    message: "simulated outage".into(),
                });
            }
            Ok(())
        }

        async fn tag_instance(&self, _tags: &TagMap) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn get_external_tags(&self) -> Result<TagMap, ProviderError> {
            Ok(self.external_tags.lock().unwrap().clone())
        }
    }

    fn test_config() -> SharedConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snooze.json");
        let mut config = Config::default();
        config.naptime_minutes = 1;
        config.check_interval_seconds = 10;
        // tempdir is dropped here; the path is only used on persist, which
        // these tests never trigger.
        SharedConfig::new(config, path)
    }

    #[tokio::test]
    async fn test_stop_called_exactly_once_on_trip() {
        let provider = MockProvider::new();
        let mut control = ControlLoop::new(
            test_config(),
            Box::new(ScriptedSampler::always_idle()),
            Some(provider.clone()),
            Arc::new(HistoryStore::new()),
        );

        for tick in 0..=6u64 {
            control.tick(tick * 10).await;
        }
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);

        // Engine was reset: the very next tick is merely Idle again.
        control.tick(70).await;
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_records_history_event() {
        let history = Arc::new(HistoryStore::new());
        let mut control = ControlLoop::new(
            test_config(),
            Box::new(ScriptedSampler::always_idle()),
            Some(MockProvider::new()),
            Arc::clone(&history),
        );

        for tick in 0..=6u64 {
            control.tick(tick * 10).await;
        }
        let events = history.query(10, None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].instance_id, "i-mock");
        assert_eq!(events[0].reason, "idle for 60s below thresholds");
    }

    #[tokio::test]
    async fn test_failed_stop_retries_next_tick() {
        let provider = MockProvider::failing();
        let mut control = ControlLoop::new(
            test_config(),
            Box::new(ScriptedSampler::always_idle()),
            Some(provider.clone()),
            Arc::new(HistoryStore::new()),
        );

        for tick in 0..=8u64 {
            control.tick(tick * 10).await;
        }
        // Trip at tick 7, then retried on each following tick.
        assert_eq!(provider.stops.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_local_only_mode_suppresses_stop() {
        let history = Arc::new(HistoryStore::new());
        let mut control = ControlLoop::new(
            test_config(),
            Box::new(ScriptedSampler::always_idle()),
            None,
            Arc::clone(&history),
        );

        for tick in 0..=6u64 {
            control.tick(tick * 10).await;
        }
        // Decision still recorded, with no instance bound.
        let events = history.query(10, None);
        assert_eq!(events.len(), 1);
        assert!(events[0].instance_id.is_empty());
    }

    #[tokio::test]
    async fn test_pause_tag_suspends_engine() {
        let provider = MockProvider::new();
        provider
            .external_tags
            .lock()
            .unwrap()
            .insert("Pause".into(), "true".into());

        let mut control = ControlLoop::new(
            test_config(),
            Box::new(ScriptedSampler::always_idle()),
            Some(provider.clone()),
            Arc::new(HistoryStore::new()),
        );

        for tick in 0..=20u64 {
            control.tick(tick * 10).await;
        }
        assert_eq!(provider.stops.load(Ordering::SeqCst), 0);
        assert!(control.status_cell().read().paused);

        // Removing the tag resumes at the t=240 poll; idle accumulates and
        // trips once at t=300.
        provider.external_tags.lock().unwrap().clear();
        for tick in 21..=30u64 {
            control.tick(tick * 10).await;
        }
        assert_eq!(provider.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_snapshot_published_each_tick() {
        let mut control = ControlLoop::new(
            test_config(),
            Box::new(ScriptedSampler::always_idle()),
            None,
            Arc::new(HistoryStore::new()),
        );
        let status = control.status_cell();

        control.tick(100).await;
        {
            let s = status.read();
            assert_eq!(s.verdict, Verdict::Idle);
            assert_eq!(s.idle_since, Some(100));
            assert_eq!(s.metrics.as_ref().unwrap().collection_time, 100);
        }

        control.tick(110).await;
        assert_eq!(status.read().metrics.as_ref().unwrap().collection_time, 110);
    }

    #[tokio::test]
    async fn test_sensor_failure_blocks_snooze() {
        let provider = MockProvider::new();
        let mut failing = MetricsSample {
            metrics: idle_metrics(),
            missing: vec![Criterion::Cpu],
        };
        failing.metrics.cpu_usage_pct = 0.0;

        let mut control = ControlLoop::new(
            test_config(),
            Box::new(ScriptedSampler::new(vec![failing])),
            Some(provider.clone()),
            Arc::new(HistoryStore::new()),
        );

        for tick in 0..=20u64 {
            control.tick(tick * 10).await;
        }
        assert_eq!(provider.stops.load(Ordering::SeqCst), 0);
        let status = control.status_cell();
        assert_eq!(status.read().reason, "cpu: unknown (threshold 10%)");
    }
}
