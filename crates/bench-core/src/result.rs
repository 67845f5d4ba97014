use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Text reported when a backend answers 2xx without a `response` field.
pub const NO_RESPONSE_PLACEHOLDER: &str = "no response received";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    HttpError,
    Timeout,
    ConnectError,
    DecodeError,
}

impl CallStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::HttpError => "http_error",
            Self::Timeout => "timeout",
            Self::ConnectError => "connect_error",
            Self::DecodeError => "decode_error",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one call. `index` is the model's position in the submitted list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    index: usize,
    model: String,
    status: CallStatus,
    response_text: String,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    http_status: Option<u16>,
}

impl CallResult {
    fn new(
        index: usize,
        model: impl Into<String>,
        status: CallStatus,
        response_text: String,
        latency: Duration,
        http_status: Option<u16>,
    ) -> Self {
        Self {
            index,
            model: model.into(),
            status,
            response_text,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            http_status,
        }
    }

    pub fn success(index: usize, model: impl Into<String>, text: impl Into<String>, latency: Duration) -> Self {
        Self::new(index, model, CallStatus::Success, text.into(), latency, None)
    }

    pub fn http_error(index: usize, model: impl Into<String>, http_status: u16, latency: Duration) -> Self {
        let text = format!("backend returned HTTP {http_status}");
        Self::new(index, model, CallStatus::HttpError, text, latency, Some(http_status))
    }

    pub fn timeout(index: usize, model: impl Into<String>, detail: impl Into<String>, latency: Duration) -> Self {
        Self::new(index, model, CallStatus::Timeout, detail.into(), latency, None)
    }

    pub fn connect_error(index: usize, model: impl Into<String>, detail: impl Into<String>, latency: Duration) -> Self {
        Self::new(index, model, CallStatus::ConnectError, detail.into(), latency, None)
    }

    pub fn decode_error(index: usize, model: impl Into<String>, detail: impl Into<String>, latency: Duration) -> Self {
        Self::new(index, model, CallStatus::DecodeError, detail.into(), latency, None)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn response_text(&self) -> &str {
        &self.response_text
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }
}

/// Every result of one session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkOutcome {
    results: Vec<CallResult>,
    elapsed: Duration,
}

impl BenchmarkOutcome {
    pub(crate) fn new(results: Vec<CallResult>, elapsed: Duration) -> Self {
        Self { results, elapsed }
    }

    pub fn results(&self) -> &[CallResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<CallResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary::from_results(&self.results, self.elapsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub by_status: BTreeMap<CallStatus, usize>,
    pub fastest_model: Option<String>,
    pub fastest_latency_ms: Option<u64>,
    pub elapsed_ms: u64,
}

impl OutcomeSummary {
    pub fn from_results(results: &[CallResult], elapsed: Duration) -> Self {
        let mut by_status = BTreeMap::new();
        for r in results {
            *by_status.entry(r.status()).or_insert(0) += 1;
        }
        let succeeded = by_status.get(&CallStatus::Success).copied().unwrap_or(0);
        let fastest = results
            .iter()
            .filter(|r| r.status().is_success())
            .min_by_key(|r| r.latency_ms());
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            by_status,
            fastest_model: fastest.map(|r| r.model().to_string()),
            fastest_latency_ms: fastest.map(CallResult::latency_ms),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
