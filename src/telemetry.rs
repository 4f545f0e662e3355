//! Telemetry: structured logging setup and metrics facade helpers.
//!
//! Counters and gauges go through the `metrics` facade; no exporter is wired
//! in by default. Log output is structured `tracing` to stderr, switchable
//! to JSON for log shippers.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Initialize the tracing subscriber. Level comes from `RUST_LOG`
/// (default `info`); output goes to stderr.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Initialize metric descriptions. Call once at startup.
pub fn init_metrics() {
    describe_counter!("snooze_ticks_total", "Control loop ticks executed");
    describe_counter!("snooze_probe_failures_total", "Metric probes that failed");
    describe_counter!("snooze_stop_requests_total", "Instance stop requests issued");
    describe_counter!("snooze_stop_failures_total", "Instance stop requests that failed");
    describe_counter!("snooze_tag_polls_total", "External tag polls performed");
    describe_gauge!("snooze_idle_seconds", "Continuous idle duration observed");
}

/// Record one control-loop tick.
pub fn record_tick() {
    counter!("snooze_ticks_total").increment(1);
}

/// Record a failed metric probe.
pub fn record_probe_failure(probe: &str) {
    counter!("snooze_probe_failures_total", "probe" => probe.to_string()).increment(1);
}

/// Record a stop request handed to a provider.
pub fn record_stop_request(provider: &str) {
    counter!("snooze_stop_requests_total", "provider" => provider.to_string()).increment(1);
}

/// Record a provider stop failure.
pub fn record_stop_failure(provider: &str) {
    counter!("snooze_stop_failures_total", "provider" => provider.to_string()).increment(1);
}

/// Record an external tag poll.
pub fn record_tag_poll(provider: &str) {
    counter!("snooze_tag_polls_total", "provider" => provider.to_string()).increment(1);
}

/// Record the current continuous idle duration.
pub fn record_idle_seconds(secs: u64) {
    gauge!("snooze_idle_seconds").set(secs as f64);
}
