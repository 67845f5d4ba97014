use std::time::Duration;

use axum::Router;
use bench_api::app;
use bench_backend::mock::{Behavior, MockBackend};
use bench_common::config::BenchConfig;
use serde_json::Value;

async fn serve(config: BenchConfig) -> (String, tokio::task::JoinHandle<()>) {
    let app: Router = app(config);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let srv = tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
    (format!("http://{}:{}", addr.ip(), addr.port()), srv)
}

/// Splits an SSE body into (event name, JSON payload) pairs.
fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(v) = line.strip_prefix("event:") { name = Some(v.trim().to_string()); }
                if let Some(v) = line.strip_prefix("data:") { data.push_str(v.trim()); }
            }
            Some((name?, serde_json::from_str(&data).ok()?))
        })
        .collect()
}

#[tokio::test]
async fn health_metrics_and_page() {
    let (base, srv) = serve(BenchConfig::default()).await;
    let client = reqwest::Client::new();

    let r = client.get(format!("{}/healthz", base)).send().await.unwrap();
    assert!(r.status().is_success());

    let r = client.get(format!("{}/metrics", base)).send().await.unwrap();
    assert!(r.status().is_success());

    let r = client.get(format!("{}/", base)).send().await.unwrap();
    assert!(r.text().await.unwrap().contains("<form id=\"bench\">"));

    let r = client.get(format!("{}/openapi.json", base)).send().await.unwrap();
    let doc: Value = r.json().await.unwrap();
    assert!(doc["paths"]["/benchmark"].is_object());

    srv.abort();
}

#[tokio::test]
async fn benchmark_streams_results_then_done() {
    let backend = MockBackend::new()
        .script("fast", Behavior::text("ok"))
        .script("broken", Behavior::status(404))
        .script("slow", Behavior::text("done").after(Duration::from_millis(300)))
        .spawn()
        .await
        .unwrap();
    let (base, srv) = serve(BenchConfig::default()).await;

    let body = serde_json::json!({
        "endpoint": backend.base_url(),
        "models": ["slow", "fast", "broken"],
        "prompt": "Hello",
        "timeout_secs": 5
    });
    let r = reqwest::Client::new().post(format!("{}/benchmark", base)).json(&body).send().await.unwrap();
    assert!(r.status().is_success());
    assert!(r.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));

    let events = parse_sse(&r.text().await.unwrap());
    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["result", "result", "result", "done"]);
    assert_eq!(events[2].1["model"], "slow");
    assert_eq!(events[2].1["response_text"], "done");

    let broken = events.iter().find(|(_, v)| v["model"] == "broken").unwrap();
    assert_eq!(broken.1["status"], "http_error");
    assert_eq!(broken.1["http_status"], 404);

    let summary = &events[3].1;
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["succeeded"], 2);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["fastest_model"], "fast");

    srv.abort();
}

#[tokio::test]
async fn comma_separated_models_and_configured_endpoint() {
    let backend = MockBackend::new().spawn().await.unwrap();
    let config = BenchConfig { endpoint: Some(backend.base_url()), ..BenchConfig::default() };
    let (base, srv) = serve(config).await;

    let body = serde_json::json!({ "models": "a, b ,a", "prompt": "hi", "auth_token": "" });
    let r = reqwest::Client::new().post(format!("{}/benchmark", base)).json(&body).send().await.unwrap();
    let events = parse_sse(&r.text().await.unwrap());
    assert_eq!(events.iter().filter(|(n, _)| n == "result").count(), 3);

    let seen = backend.log.snapshot();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|c| c.authorization.is_none()));

    srv.abort();
}

#[tokio::test]
async fn invalid_input_is_rejected_before_dispatch() {
    let backend = MockBackend::new().spawn().await.unwrap();
    let (base, srv) = serve(BenchConfig::default()).await;
    let client = reqwest::Client::new();

    let bad_url = serde_json::json!({ "endpoint": "not a url", "models": ["m"], "prompt": "hi" });
    let r = client.post(format!("{}/benchmark", base)).json(&bad_url).send().await.unwrap();
    assert_eq!(r.status(), reqwest::StatusCode::BAD_REQUEST);
    let err: Value = r.json().await.unwrap();
    assert!(err["error"].as_str().unwrap().contains("endpoint"));

    let no_models = serde_json::json!({ "endpoint": backend.base_url(), "models": " , ", "prompt": "hi" });
    let r = client.post(format!("{}/benchmark", base)).json(&no_models).send().await.unwrap();
    assert_eq!(r.status(), reqwest::StatusCode::BAD_REQUEST);

    let no_prompt = serde_json::json!({ "endpoint": backend.base_url(), "models": ["m"], "prompt": "  " });
    let r = client.post(format!("{}/benchmark", base)).json(&no_prompt).send().await.unwrap();
    assert_eq!(r.status(), reqwest::StatusCode::BAD_REQUEST);

    assert!(backend.log.is_empty());
    srv.abort();
}
