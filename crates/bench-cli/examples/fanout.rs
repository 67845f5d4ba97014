use std::time::{Duration, Instant};

use bench_backend::mock::{Behavior, MockBackend};
use bench_core::{Session, StreamEvent};

/// Runs N scripted models with staggered delays and prints the completion order.
#[tokio::main]
async fn main() {
    let n: u64 = std::env::var("N").ok().and_then(|v| v.parse().ok()).unwrap_or(16);
    let max_in_flight: Option<usize> = std::env::var("MAX_IN_FLIGHT").ok().and_then(|v| v.parse().ok());

    let mut backend = MockBackend::new();
    let mut models = Vec::new();
    for i in 0..n {
        let model = format!("model-{i}");
        // reverse stagger so completion order differs from submission order
        backend = backend.script(&model, Behavior::text("ok").after(Duration::from_millis((n - i) * 25)));
        models.push(model);
    }
    let server = backend.spawn().await.expect("bind mock backend");

    let mut builder = Session::builder(server.base_url()).prompt("Hello").models(models);
    if let Some(limit) = max_in_flight {
        builder = builder.max_in_flight(limit);
    }
    let session = builder.build().expect("valid session");

    let start = Instant::now();
    let mut stream = bench_core::dispatch(session).expect("dispatch");
    while let Some(StreamEvent::Result(r)) = stream.next().await {
        println!("{:>8.3}s  {:<10} {:<8} {}ms", start.elapsed().as_secs_f32(), r.model(), r.status(), r.latency_ms());
    }
    println!("completed {} calls in {:.2}s", n, start.elapsed().as_secs_f32());
}
