use std::error::Error as _;
use std::future::Future;

use bench_common::{BenchError, Result};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::result::{CallResult, NO_RESPONSE_PLACEHOLDER};
use crate::session::Session;

/// Performs one call for one model. Must always produce a result; failures are values.
pub trait CallExecutor: Send + Sync + 'static {
    fn execute(&self, session: &Session, index: usize, model: &str) -> impl Future<Output = CallResult> + Send;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: Option<String>,
}

/// Calls `POST {endpoint}/api/generate` with reqwest.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Client configured with the session's connect timeout and TLS policy.
    pub fn for_session(session: &Session) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(session.connect_timeout())
            .danger_accept_invalid_certs(session.accept_invalid_certs())
            .build()
            .map_err(|e| BenchError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl CallExecutor for HttpExecutor {
    async fn execute(&self, session: &Session, index: usize, model: &str) -> CallResult {
        let url = session.generate_url();
        let body = GenerateRequest { model, prompt: session.prompt(), stream: false };
        let mut request = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .timeout(session.per_call_timeout())
            .json(&body);
        if let Some(token) = session.auth_token() {
            request = request.bearer_auth(token.expose());
        }

        tracing::debug!(target: "executor", model, index, %url, "dispatching call");
        let started = Instant::now();
        let outcome = async {
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        }
        .await;
        let latency = started.elapsed();

        let result = match outcome {
            Err(err) => classify_transport_error(index, model, &err, latency),
            Ok((status, _)) if !status.is_success() => CallResult::http_error(index, model, status.as_u16(), latency),
            Ok((_, bytes)) => decode_reply(index, model, &bytes, latency),
        };
        tracing::debug!(
            target: "executor",
            model,
            index,
            status = %result.status(),
            latency_ms = result.latency_ms(),
            "call finished"
        );
        result
    }
}

fn classify_transport_error(index: usize, model: &str, err: &reqwest::Error, latency: std::time::Duration) -> CallResult {
    if err.is_timeout() {
        let detail = format!(
            "request timed out after {:.2}s; consider increasing timeout values",
            latency.as_secs_f64()
        );
        return CallResult::timeout(index, model, detail, latency);
    }
    CallResult::connect_error(index, model, describe(err), latency)
}

fn decode_reply(index: usize, model: &str, bytes: &[u8], latency: std::time::Duration) -> CallResult {
    match serde_json::from_slice::<GenerateReply>(bytes) {
        Ok(GenerateReply { response: Some(text) }) => CallResult::success(index, model, text, latency),
        Ok(GenerateReply { response: None }) => CallResult::success(index, model, NO_RESPONSE_PLACEHOLDER, latency),
        Err(e) => CallResult::decode_error(index, model, format!("invalid JSON from backend: {e}"), latency),
    }
}

/// reqwest's top-level message hides the cause; append the source chain.
fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::CallStatus;
    use std::time::Duration;

    #[test]
    fn decode_reply_handles_missing_null_and_mistyped_fields() {
        let ms = Duration::from_millis(5);
        let ok = decode_reply(0, "m", br#"{"response":"hi","done":true}"#, ms);
        assert_eq!(ok.status(), CallStatus::Success);
        assert_eq!(ok.response_text(), "hi");

        let null = decode_reply(0, "m", br#"{"response":null}"#, ms);
        assert_eq!(null.status(), CallStatus::Success);
        assert_eq!(null.response_text(), NO_RESPONSE_PLACEHOLDER);

        let mistyped = decode_reply(0, "m", br#"{"response":42}"#, ms);
        assert_eq!(mistyped.status(), CallStatus::DecodeError);

        let not_object = decode_reply(0, "m", b"[1,2]", ms);
        assert_eq!(not_object.status(), CallStatus::DecodeError);
    }

    #[test]
    fn success_text_is_not_escaped() {
        let r = decode_reply(3, "m", br#"{"response":"<b>a & b</b>"}"#, Duration::ZERO);
        assert_eq!(r.response_text(), "<b>a & b</b>");
        assert_eq!(r.index(), 3);
    }
}
