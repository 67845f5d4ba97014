pub type Result<T> = core::result::Result<T, BenchError>;

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error("invalid endpoint URL `{0}`")]
    InvalidEndpoint(String),
    #[error("model list is empty")]
    EmptyModels,
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("invalid dispatch policy: {0}")]
    InvalidPolicy(String),
    #[error("config: {0}")]
    Config(String),
    #[error("http client: {0}")]
    HttpClient(String),
    #[error("result stream closed before completion ({received} of {expected} results)")]
    StreamClosed { received: usize, expected: usize },
}

impl BenchError {
    /// Session-level errors are raised before anything is dispatched.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint(_) | Self::EmptyModels | Self::EmptyPrompt | Self::InvalidPolicy(_)
        )
    }
}

pub mod config {
    use serde::Deserialize;
    use std::env;
    use std::fmt;

    use crate::{BenchError, Result};

    pub const DEFAULT_TIMEOUT_SECS: u64 = 360;
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 90;
    pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

    #[derive(Clone, Deserialize, PartialEq, Eq)]
    #[serde(default)]
    pub struct BenchConfig {
        pub endpoint: Option<String>,
        pub auth_token: Option<String>,
        pub timeout_secs: u64,
        pub connect_timeout_secs: u64,
        pub max_in_flight: Option<usize>,
        pub dispatch_gap_ms: Option<u64>,
        pub deadline_secs: Option<u64>,
        pub accept_invalid_certs: bool,
        pub listen: String,
    }

    impl Default for BenchConfig {
        fn default() -> Self {
            Self {
                endpoint: None,
                auth_token: None,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
                max_in_flight: None,
                dispatch_gap_ms: None,
                deadline_secs: None,
                accept_invalid_certs: false,
                listen: DEFAULT_LISTEN.to_string(),
            }
        }
    }

    impl fmt::Debug for BenchConfig {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("BenchConfig")
                .field("endpoint", &self.endpoint)
                .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
                .field("timeout_secs", &self.timeout_secs)
                .field("connect_timeout_secs", &self.connect_timeout_secs)
                .field("max_in_flight", &self.max_in_flight)
                .field("dispatch_gap_ms", &self.dispatch_gap_ms)
                .field("deadline_secs", &self.deadline_secs)
                .field("accept_invalid_certs", &self.accept_invalid_certs)
                .field("listen", &self.listen)
                .finish()
        }
    }

    impl BenchConfig {
        /// YAML file from `BENCH_CONFIG` if set, otherwise defaults overlaid with `BENCH_*` variables.
        pub fn load() -> Result<Self> {
            if let Ok(path) = env::var("BENCH_CONFIG") {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| BenchError::Config(format!("reading {path}: {e}")))?;
                return Self::from_yaml_str(&text);
            }
            let mut cfg = Self::default();
            cfg.apply_env(|key| env::var(key).ok());
            Ok(cfg)
        }

        pub fn from_yaml_str(text: &str) -> Result<Self> {
            serde_yaml::from_str(text).map_err(|e| BenchError::Config(e.to_string()))
        }

        /// Unparsable numeric values are ignored and the current value kept.
        pub fn apply_env<F>(&mut self, lookup: F)
        where
            F: Fn(&str) -> Option<String>,
        {
            if let Some(v) = lookup("BENCH_ENDPOINT") { self.endpoint = Some(v); }
            if let Some(v) = lookup("BENCH_AUTH_TOKEN") { self.auth_token = Some(v); }
            if let Some(v) = lookup("BENCH_TIMEOUT_SECS").and_then(|v| v.parse().ok()) { self.timeout_secs = v; }
            if let Some(v) = lookup("BENCH_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) { self.connect_timeout_secs = v; }
            if let Some(v) = lookup("BENCH_MAX_IN_FLIGHT").and_then(|v| v.parse().ok()) { self.max_in_flight = Some(v); }
            if let Some(v) = lookup("BENCH_DISPATCH_GAP_MS").and_then(|v| v.parse().ok()) { self.dispatch_gap_ms = Some(v); }
            if let Some(v) = lookup("BENCH_DEADLINE_SECS").and_then(|v| v.parse().ok()) { self.deadline_secs = Some(v); }
            if let Some(v) = lookup("BENCH_LISTEN") { self.listen = v; }
        }
    }
}
