use std::collections::HashMap;

use bench_common::config::{BenchConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
use bench_common::BenchError;

#[test]
fn defaults_match_original_timeouts() {
    let cfg = BenchConfig::default();
    assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert_eq!(cfg.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    assert!(cfg.max_in_flight.is_none());
    assert!(cfg.dispatch_gap_ms.is_none());
    assert!(!cfg.accept_invalid_certs);
}

#[test]
fn yaml_fills_missing_fields_with_defaults() {
    let cfg = BenchConfig::from_yaml_str("endpoint: http://localhost:11434\nmax_in_flight: 2\n").unwrap();
    assert_eq!(cfg.endpoint.as_deref(), Some("http://localhost:11434"));
    assert_eq!(cfg.max_in_flight, Some(2));
    assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
}

#[test]
fn bad_yaml_is_a_config_error() {
    let err = BenchConfig::from_yaml_str("timeout_secs: [oops").unwrap_err();
    assert!(matches!(err, BenchError::Config(_)));
    assert!(!err.is_session_error());
}

#[test]
fn env_overlay_ignores_unparsable_numbers() {
    let vars: HashMap<&str, &str> = [
        ("BENCH_ENDPOINT", "http://gpu-box:11434"),
        ("BENCH_TIMEOUT_SECS", "30"),
        ("BENCH_CONNECT_TIMEOUT_SECS", "soon"),
        ("BENCH_DISPATCH_GAP_MS", "500"),
    ]
    .into_iter()
    .collect();
    let mut cfg = BenchConfig::default();
    cfg.apply_env(|k| vars.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.endpoint.as_deref(), Some("http://gpu-box:11434"));
    assert_eq!(cfg.timeout_secs, 30);
    assert_eq!(cfg.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    assert_eq!(cfg.dispatch_gap_ms, Some(500));
}

#[test]
fn debug_output_redacts_token() {
    let cfg = BenchConfig { auth_token: Some("sk-secret".into()), ..BenchConfig::default() };
    let shown = format!("{cfg:?}");
    assert!(!shown.contains("sk-secret"));
    assert!(shown.contains("<redacted>"));
}
