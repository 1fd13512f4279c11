//! Instrumentation call sites (§4.I). Thin wrappers over the `metrics` facade
//! — this crate never bundles an exporter, it only emits into whatever sink
//! the embedding application installs.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub fn cache_hit() {
    counter!("cache.hits").increment(1);
}

pub fn cache_miss() {
    counter!("cache.misses").increment(1);
}

pub fn evaluation(strategy: &'static str) {
    counter!("evaluations", "strategy" => strategy).increment(1);
}

pub fn refresh_success() {
    counter!("refresh.success").increment(1);
}

pub fn refresh_failure() {
    counter!("refresh.failure").increment(1);
}

pub fn webhook_event(event_type: &str) {
    counter!("webhook.events", "type" => event_type.to_string()).increment(1);
}

pub fn refresh_duration(elapsed: Duration) {
    histogram!("refresh.duration_ms").record(elapsed.as_secs_f64() * 1000.0);
}

pub fn evaluation_duration(elapsed: Duration) {
    histogram!("evaluation.duration_ms").record(elapsed.as_secs_f64() * 1000.0);
}

/// 0 = Closed, 1 = HalfOpen, 2 = Open (§4.I).
pub fn circuit_state(state: u8) {
    gauge!("circuit.state").set(state as f64);
}

pub fn cache_size(size: u64) {
    gauge!("cache.size").set(size as f64);
}

pub fn cache_hit_ratio(ratio: f64) {
    gauge!("cache.hit_ratio").set(ratio);
}
