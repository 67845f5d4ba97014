//! HTTP front end: form page, streaming benchmark endpoint (SSE), health and metrics.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use bench_common::config::BenchConfig;
use bench_common::BenchError;
use bench_core::{OutcomeSummary, SessionBuilder, StreamEvent};
use serde::Deserialize;
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt as _};

mod page;

#[derive(Clone)]
pub struct AppState {
    config: Arc<BenchConfig>,
}

pub fn app(config: BenchConfig) -> Router {
    bench_obs::init();
    let state = AppState { config: Arc::new(config) };

    Router::new()
        .route("/", get(|| async { Html(page::INDEX_HTML) }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics))
        .route("/benchmark", post(benchmark))
        .route("/openapi.json", get(openapi))
        .with_state(state)
}

async fn metrics() -> impl IntoResponse {
    let (content_type, body) = bench_obs::render();
    ([("content-type", content_type)], body)
}

/// Models may be sent as a JSON array or as the comma-separated form value.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ModelList {
    List(Vec<String>),
    Csv(String),
}

#[derive(Debug, Deserialize)]
pub struct BenchmarkRequest {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub models: ModelList,
    pub prompt: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    #[serde(default)]
    pub dispatch_gap_ms: Option<u64>,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl BenchmarkRequest {
    /// Request fields override the server's configured defaults.
    fn into_builder(self, config: &BenchConfig) -> SessionBuilder {
        let mut builder = SessionBuilder::from_config(config).prompt(self.prompt);
        builder = match self.models {
            ModelList::List(models) => builder.models(models),
            ModelList::Csv(raw) => builder.model_list(&raw),
        };
        if let Some(endpoint) = self.endpoint.filter(|e| !e.trim().is_empty()) { builder = builder.endpoint(endpoint); }
        if let Some(token) = self.auth_token { builder = builder.auth_token(token); }
        if let Some(v) = self.timeout_secs { builder = builder.per_call_timeout(Duration::from_secs(v)); }
        if let Some(v) = self.connect_timeout_secs { builder = builder.connect_timeout(Duration::from_secs(v)); }
        if let Some(v) = self.max_in_flight { builder = builder.max_in_flight(v); }
        if let Some(v) = self.dispatch_gap_ms { builder = builder.min_dispatch_gap(Duration::from_millis(v)); }
        if let Some(v) = self.deadline_secs { builder = builder.deadline(Duration::from_secs(v)); }
        builder
    }
}

pub struct ApiError(BenchError);

impl From<BenchError> for ApiError {
    fn from(err: BenchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_session_error() { StatusCode::BAD_REQUEST } else { StatusCode::INTERNAL_SERVER_ERROR };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn benchmark(
    State(state): State<AppState>,
    Json(req): Json<BenchmarkRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = req.into_builder(&state.config).build()?;
    tracing::info!(target: "api", endpoint = %session.endpoint(), models = session.models().len(), "benchmark request");
    let results = bench_core::dispatch(session)?;

    let metrics = bench_obs::session_started();
    let started = Instant::now();
    let mut seen = Vec::with_capacity(results.expected());
    let events = results.into_stream().map(move |event| {
        let sse = match event {
            StreamEvent::Result(result) => {
                metrics.record_call(&result);
                let sse = json_event("result", &result);
                seen.push(result);
                sse
            }
            StreamEvent::Done => json_event("done", &OutcomeSummary::from_results(&seen, started.elapsed())),
        };
        Ok(sse)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn json_event<T: serde::Serialize>(name: &str, payload: &T) -> Event {
    match serde_json::to_string(payload) {
        Ok(data) => Event::default().event(name).data(data),
        Err(err) => {
            tracing::error!(target: "api", "failed to serialize {name} event: {err}");
            Event::default().event("error").data(err.to_string())
        }
    }
}

async fn openapi() -> impl IntoResponse {
    let spec = serde_json::json!({
        "openapi": "3.0.0",
        "info": {"title": "Model Bench API", "version": env!("CARGO_PKG_VERSION")},
        "paths": {
            "/": {"get": {"summary": "Benchmark form"}},
            "/benchmark": {"post": {"summary": "Dispatch one prompt to several models; streams `result` events then `done` (SSE)"}},
            "/metrics": {"get": {"summary": "Prometheus metrics"}},
            "/healthz": {"get": {"summary": "health"}},
            "/openapi.json": {"get": {"summary": "this document"}}
        }
    });
    Json(spec)
}
