use std::time::Duration;

use bench_backend::mock::{Behavior, MockBackend};
use bench_core::{CallExecutor, CallStatus, HttpExecutor, Session, NO_RESPONSE_PLACEHOLDER};

fn session_for(base: &str, model: &str) -> Session {
    Session::builder(base)
        .prompt("Say hello")
        .models([model])
        .per_call_timeout(Duration::from_millis(400))
        .connect_timeout(Duration::from_millis(400))
        .build()
        .unwrap()
}

async fn call(mock: MockBackend, model: &str) -> bench_core::CallResult {
    let server = mock.spawn().await.unwrap();
    let session = session_for(&server.base_url(), model);
    let executor = HttpExecutor::for_session(&session).unwrap();
    executor.execute(&session, 0, model).await
}

#[tokio::test]
async fn success_returns_response_field_verbatim() {
    let r = call(MockBackend::new().script("m", Behavior::text("hello")), "m").await;
    assert_eq!(r.status(), CallStatus::Success);
    assert_eq!(r.response_text(), "hello");
    assert_eq!(r.model(), "m");
    assert_eq!(r.http_status(), None);
}

#[tokio::test]
async fn missing_response_field_is_success_with_placeholder() {
    let r = call(MockBackend::new().script("m", Behavior::raw("{}")), "m").await;
    assert_eq!(r.status(), CallStatus::Success);
    assert_eq!(r.response_text(), NO_RESPONSE_PLACEHOLDER);
}

#[tokio::test]
async fn truncated_body_is_decode_error() {
    let r = call(MockBackend::new().script("m", Behavior::raw(r#"{"response": "hel"#)), "m").await;
    assert_eq!(r.status(), CallStatus::DecodeError);
    assert!(!r.response_text().is_empty());
}

#[tokio::test]
async fn server_error_is_http_error_without_body() {
    let r = call(MockBackend::new().script("m", Behavior::status(500)), "m").await;
    assert_eq!(r.status(), CallStatus::HttpError);
    assert_eq!(r.http_status(), Some(500));
    assert!(!r.response_text().is_empty());
    assert!(!r.response_text().contains("scripted failure"));
}

#[tokio::test]
async fn hanging_backend_times_out_with_elapsed_latency() {
    let r = call(MockBackend::new().script("m", Behavior::Hang), "m").await;
    assert_eq!(r.status(), CallStatus::Timeout);
    assert!(r.latency() >= Duration::from_millis(350), "latency {:?}", r.latency());
    assert!(r.latency() < Duration::from_secs(5));
}

#[tokio::test]
async fn refused_connection_is_connect_error() {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = session_for(&format!("http://{addr}"), "m");
    let r = HttpExecutor::for_session(&session).unwrap().execute(&session, 0, "m").await;
    assert_eq!(r.status(), CallStatus::ConnectError);
    assert!(!r.response_text().is_empty());
}

// Needs a route that silently drops SYNs; sandboxes often reset instead.
#[tokio::test]
#[ignore = "requires a blackholed address"]
async fn unanswered_connect_is_timeout() {
    let session = Session::builder("http://10.255.255.1:80")
        .prompt("Say hello")
        .models(["m"])
        .per_call_timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let executor = HttpExecutor::for_session(&session).unwrap();
    let r = executor.execute(&session, 0, "m").await;
    assert_eq!(r.status(), CallStatus::Timeout, "{}", r.response_text());
    assert!(r.latency() < Duration::from_secs(5), "latency {:?}", r.latency());
}

#[tokio::test]
async fn request_shape_and_bearer_token() {
    let server = MockBackend::new().spawn().await.unwrap();
    let session = Session::builder(server.base_url())
        .prompt("ping")
        .models(["llama3"])
        .auth_token("sk-test")
        .build()
        .unwrap();
    let r = HttpExecutor::for_session(&session).unwrap().execute(&session, 0, "llama3").await;
    assert_eq!(r.status(), CallStatus::Success);
    assert_eq!(r.response_text(), "llama3: ping");

    let seen = server.log.snapshot();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].model.as_deref(), Some("llama3"));
    assert_eq!(seen[0].prompt.as_deref(), Some("ping"));
    assert_eq!(seen[0].stream, Some(false));
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen[0].content_type.as_deref(), Some("application/json"));
    assert_eq!(seen[0].accept.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn no_authorization_header_without_token() {
    let server = MockBackend::new().spawn().await.unwrap();
    let session = session_for(&server.base_url(), "m");
    HttpExecutor::for_session(&session).unwrap().execute(&session, 0, "m").await;
    assert_eq!(server.log.snapshot()[0].authorization, None);
}
