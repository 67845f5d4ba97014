//! Scripted `/api/generate` server.
//!
//! Each model name maps to a [`Behavior`]: a delayed JSON reply, a delayed
//! error status, a raw (possibly broken) body, or a request that never
//! answers. Unscripted models fall back to echoing the prompt.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Replies `{"response": "<model>: <prompt>"}`.
    Echo { delay: Duration },
    /// Replies 200 with this exact body.
    Raw { delay: Duration, body: String },
    /// Replies with this status and a small JSON error body.
    Status { delay: Duration, code: u16 },
    /// Accepts the request and never answers.
    Hang,
}

impl Default for Behavior {
    fn default() -> Self {
        Self::Echo { delay: Duration::ZERO }
    }
}

impl Behavior {
    pub fn text(text: &str) -> Self {
        Self::json(serde_json::json!({ "response": text, "done": true }))
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::Raw { delay: Duration::ZERO, body: value.to_string() }
    }

    pub fn raw(body: impl Into<String>) -> Self {
        Self::Raw { delay: Duration::ZERO, body: body.into() }
    }

    pub fn status(code: u16) -> Self {
        Self::Status { delay: Duration::ZERO, code }
    }

    /// Same behavior, answered after `delay`. No effect on [`Behavior::Hang`].
    pub fn after(self, delay: Duration) -> Self {
        match self {
            Self::Echo { .. } => Self::Echo { delay },
            Self::Raw { body, .. } => Self::Raw { delay, body },
            Self::Status { code, .. } => Self::Status { delay, code },
            Self::Hang => Self::Hang,
        }
    }

    /// Parses `echo`, `hang`, `text:<s>`, `raw:<body>` or `status:<code>`,
    /// optionally suffixed with `@<millis>` for a delay.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (body, delay) = match spec.rsplit_once('@') {
            Some((head, ms)) => match ms.parse::<u64>() {
                Ok(ms) => (head, Duration::from_millis(ms)),
                Err(_) => (spec, Duration::ZERO),
            },
            None => (spec, Duration::ZERO),
        };
        let behavior = match body.split_once(':') {
            None if body == "echo" => Self::default(),
            None if body == "hang" => Self::Hang,
            Some(("text", text)) => Self::text(text),
            Some(("raw", raw)) => Self::raw(raw),
            Some(("status", code)) => {
                let code = code.parse::<u16>().map_err(|_| format!("invalid status code `{code}`"))?;
                StatusCode::from_u16(code).map_err(|_| format!("invalid status code `{code}`"))?;
                Self::status(code)
            }
            _ => return Err(format!("unknown behavior `{spec}`")),
        };
        Ok(behavior.after(delay))
    }

    fn delay(&self) -> Duration {
        match self {
            Self::Echo { delay } | Self::Raw { delay, .. } | Self::Status { delay, .. } => *delay,
            Self::Hang => Duration::ZERO,
        }
    }
}

/// What the mock saw for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCall {
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub stream: Option<bool>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<ReceivedCall>>>);

impl CallLog {
    pub fn snapshot(&self) -> Vec<ReceivedCall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, call: ReceivedCall) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    scripts: HashMap<String, Behavior>,
    fallback: Behavior,
    log: CallLog,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, model: impl Into<String>, behavior: Behavior) -> Self {
        self.scripts.insert(model.into(), behavior);
        self
    }

    pub fn fallback(mut self, behavior: Behavior) -> Self {
        self.fallback = behavior;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(|| async { "mock generate backend" }))
            .route("/api/generate", post(generate))
            .with_state(Arc::new(self))
    }

    /// Serves on an ephemeral localhost port until the returned handle is dropped.
    pub async fn spawn(self) -> std::io::Result<RunningMock> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let log = self.log();
        let app = self.router();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(target: "mock", "mock backend stopped: {err}");
            }
        });
        Ok(RunningMock { addr, log, task })
    }

    fn behavior_for(&self, model: Option<&str>) -> &Behavior {
        model.and_then(|m| self.scripts.get(m)).unwrap_or(&self.fallback)
    }
}

pub struct RunningMock {
    pub addr: SocketAddr,
    pub log: CallLog,
    task: JoinHandle<()>,
}

impl RunningMock {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for RunningMock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn generate(State(mock): State<Arc<MockBackend>>, headers: HeaderMap, body: Bytes) -> Response {
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let model = parsed.get("model").and_then(|v| v.as_str()).map(str::to_string);
    let prompt = parsed.get("prompt").and_then(|v| v.as_str()).map(str::to_string);
    let header_text = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    mock.log.push(ReceivedCall {
        model: model.clone(),
        prompt: prompt.clone(),
        stream: parsed.get("stream").and_then(|v| v.as_bool()),
        authorization: header_text(header::AUTHORIZATION),
        content_type: header_text(header::CONTENT_TYPE),
        accept: header_text(header::ACCEPT),
    });

    let behavior = mock.behavior_for(model.as_deref()).clone();
    tracing::debug!(target: "mock", model = ?model, ?behavior, "generate request");
    if behavior == Behavior::Hang {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(behavior.delay()).await;

    match behavior {
        Behavior::Echo { .. } => {
            let text = format!("{}: {}", model.unwrap_or_default(), prompt.unwrap_or_default());
            Json(serde_json::json!({ "response": text, "done": true })).into_response()
        }
        Behavior::Raw { body, .. } => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Behavior::Status { code, .. } => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(serde_json::json!({ "error": "scripted failure" }))).into_response()
        }
        Behavior::Hang => StatusCode::GATEWAY_TIMEOUT.into_response(),
    }
}
