//! Observability utilities: Prometheus collectors for benchmark sessions and calls

use bench_core::CallResult;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder};

static SESSIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    prometheus::register_int_counter!("bench_sessions_total", "Benchmark sessions dispatched")
        .expect("bench_sessions_total registers once")
});
static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    prometheus::register_int_gauge!("bench_active_sessions", "Sessions with calls still outstanding")
        .expect("bench_active_sessions registers once")
});
static CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec!("bench_calls_total", "Completed backend calls", &["status"])
        .expect("bench_calls_total registers once")
});
static CALL_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    prometheus::register_histogram_vec!(
        "bench_call_latency_seconds",
        "Backend call latency",
        &["status"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 360.0]
    )
    .expect("bench_call_latency_seconds registers once")
});

pub fn init() {
    Lazy::force(&SESSIONS_TOTAL);
    Lazy::force(&ACTIVE_SESSIONS);
    Lazy::force(&CALLS_TOTAL);
    Lazy::force(&CALL_LATENCY);
}

/// Counts a session as started; it stays active until the handle is dropped.
pub fn session_started() -> SessionMetrics {
    SESSIONS_TOTAL.inc();
    ACTIVE_SESSIONS.inc();
    SessionMetrics { _private: () }
}

pub struct SessionMetrics {
    _private: (),
}

impl SessionMetrics {
    pub fn record_call(&self, result: &CallResult) {
        let status = result.status().as_str();
        CALLS_TOTAL.with_label_values(&[status]).inc();
        CALL_LATENCY.with_label_values(&[status]).observe(result.latency().as_secs_f64());
    }
}

impl Drop for SessionMetrics {
    fn drop(&mut self) {
        ACTIVE_SESSIONS.dec();
    }
}

/// Current registry contents in the Prometheus text format.
pub fn render() -> (String, Vec<u8>) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(target: "obs", "failed to encode metrics: {err}");
    }
    (encoder.format_type().to_string(), buffer)
}
