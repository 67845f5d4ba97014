use std::fmt;
use std::time::Duration;

use bench_common::config::{BenchConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
use bench_common::{BenchError, Result};
use reqwest::Url;

pub const GENERATE_PATH: &str = "/api/generate";

/// Bearer token forwarded to the backend. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Admission and cancellation knobs for one dispatch. All off by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub max_in_flight: Option<usize>,
    pub min_dispatch_gap: Option<Duration>,
    pub deadline: Option<Duration>,
}

impl DispatchPolicy {
    fn validate(&self) -> Result<()> {
        if self.max_in_flight == Some(0) {
            return Err(BenchError::InvalidPolicy("max_in_flight must be at least 1".into()));
        }
        if self.deadline == Some(Duration::ZERO) {
            return Err(BenchError::InvalidPolicy("deadline must be greater than zero".into()));
        }
        Ok(())
    }
}

/// One validated benchmark request. Built only through [`SessionBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    endpoint: String,
    auth_token: Option<AuthToken>,
    prompt: String,
    models: Vec<String>,
    per_call_timeout: Duration,
    connect_timeout: Duration,
    policy: DispatchPolicy,
    accept_invalid_certs: bool,
}

impl Session {
    pub fn builder(endpoint: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn generate_url(&self) -> String {
        format!("{}{}", self.endpoint, GENERATE_PATH)
    }

    pub fn auth_token(&self) -> Option<&AuthToken> {
        self.auth_token.as_ref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn per_call_timeout(&self) -> Duration {
        self.per_call_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    /// Re-checks the invariants the dispatcher relies on.
    pub fn validate(&self) -> Result<()> {
        normalize_endpoint(&self.endpoint)?;
        if self.models.is_empty() {
            return Err(BenchError::EmptyModels);
        }
        if self.prompt.trim().is_empty() {
            return Err(BenchError::EmptyPrompt);
        }
        if self.per_call_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(BenchError::InvalidPolicy("timeouts must be greater than zero".into()));
        }
        self.policy.validate()
    }
}

#[derive(Debug, Clone)]
pub struct SessionBuilder {
    endpoint: String,
    auth_token: Option<String>,
    prompt: String,
    models: Vec<String>,
    per_call_timeout: Duration,
    connect_timeout: Duration,
    policy: DispatchPolicy,
    accept_invalid_certs: bool,
}

impl SessionBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: None,
            prompt: String::new(),
            models: Vec::new(),
            per_call_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            policy: DispatchPolicy::default(),
            accept_invalid_certs: false,
        }
    }

    /// Seeds endpoint, token, timeouts and policy from loaded configuration.
    pub fn from_config(cfg: &BenchConfig) -> Self {
        let mut builder = Self::new(cfg.endpoint.clone().unwrap_or_default())
            .per_call_timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .accept_invalid_certs(cfg.accept_invalid_certs);
        builder.auth_token = cfg.auth_token.clone();
        builder.policy = DispatchPolicy {
            max_in_flight: cfg.max_in_flight,
            min_dispatch_gap: cfg.dispatch_gap_ms.map(Duration::from_millis),
            deadline: cfg.deadline_secs.map(Duration::from_secs),
        };
        builder
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Comma-separated list, as typed into the form.
    pub fn model_list(self, raw: &str) -> Self {
        self.models(parse_model_list(raw))
    }

    pub fn per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.policy.max_in_flight = Some(limit);
        self
    }

    pub fn min_dispatch_gap(mut self, gap: Duration) -> Self {
        self.policy.min_dispatch_gap = Some(gap);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.policy.deadline = Some(deadline);
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> Result<Session> {
        let endpoint = normalize_endpoint(&self.endpoint)?;
        let models: Vec<String> = self
            .models
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        let prompt = self.prompt.trim().to_string();
        let auth_token = self
            .auth_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(AuthToken);

        let session = Session {
            endpoint,
            auth_token,
            prompt,
            models,
            per_call_timeout: self.per_call_timeout,
            connect_timeout: self.connect_timeout,
            policy: self.policy,
            accept_invalid_certs: self.accept_invalid_certs,
        };
        session.validate()?;
        tracing::debug!(
            target: "session",
            endpoint = %session.endpoint,
            models = session.models.len(),
            authenticated = session.auth_token.is_some(),
            "session built"
        );
        Ok(session)
    }
}

pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trims whitespace and trailing slashes; only absolute http(s) URLs with a host pass.
fn normalize_endpoint(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|_| BenchError::InvalidEndpoint(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https")
        || url.host_str().map_or(true, str::is_empty)
        || url.query().is_some()
        || url.fragment().is_some()
    {
        return Err(BenchError::InvalidEndpoint(raw.to_string()));
    }
    Ok(trimmed.to_string())
}
