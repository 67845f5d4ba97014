use std::io::Write;
use std::time::Duration;

use anyhow::Context as _;
use bench_api::app;
use bench_backend::mock::{Behavior, MockBackend};
use bench_common::config::BenchConfig;
use bench_common::BenchError;
use bench_core::{CallResult, OutcomeSummary, Session, SessionBuilder, StreamEvent};
use clap::{Args, Parser, Subcommand};
use opentelemetry_otlp::WithExportConfig as _;
use tokio_stream::{Stream, StreamExt as _};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bench", version, about = "Send one prompt to several models and compare latency")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Benchmark the given models and print results as they complete
    Run(RunArgs),
    /// Serve the web form and streaming API
    Serve(ServeArgs),
    /// Serve a scripted generate backend for local trials
    Mock(MockArgs),
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Backend base URL; defaults to BENCH_ENDPOINT
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Comma-separated model names; duplicates are benchmarked separately
    #[arg(short, long)]
    models: String,
    #[arg(short, long)]
    prompt: String,
    #[arg(long)]
    auth_token: Option<String>,
    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Connect timeout in seconds
    #[arg(long)]
    connect_timeout: Option<u64>,
    #[arg(long)]
    max_in_flight: Option<usize>,
    /// Minimum gap between dispatches, in milliseconds
    #[arg(long)]
    dispatch_gap_ms: Option<u64>,
    /// Whole-session deadline in seconds
    #[arg(long)]
    deadline: Option<u64>,
    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,
    /// Emit one JSON object per line instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address; defaults to BENCH_LISTEN or 0.0.0.0:8080
    #[arg(short, long)]
    listen: Option<String>,
}

#[derive(Args, Debug)]
struct MockArgs {
    #[arg(short, long, default_value = "127.0.0.1:11434")]
    listen: String,
    /// MODEL=BEHAVIOR, e.g. fast=text:ok@10, slow=text:done@2000, broken=status:404, stuck=hang
    #[arg(short, long = "script", value_parser = parse_script)]
    scripts: Vec<(String, Behavior)>,
    /// Behavior for unscripted models
    #[arg(long, value_parser = Behavior::parse, default_value = "echo")]
    fallback: Behavior,
}

fn parse_script(raw: &str) -> Result<(String, Behavior), String> {
    let (model, spec) = raw.split_once('=').ok_or_else(|| format!("expected MODEL=BEHAVIOR, got `{raw}`"))?;
    Ok((model.trim().to_string(), Behavior::parse(spec.trim())?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(load_config()?, args).await,
        Commands::Serve(args) => serve(load_config()?, args).await,
        Commands::Mock(args) => mock(args).await,
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config() -> anyhow::Result<BenchConfig> {
    BenchConfig::load().context("loading configuration")
}

fn session_from_args(config: &BenchConfig, args: &RunArgs) -> bench_common::Result<Session> {
    let mut builder = SessionBuilder::from_config(config).model_list(&args.models).prompt(args.prompt.as_str());
    if let Some(endpoint) = &args.endpoint { builder = builder.endpoint(endpoint.as_str()); }
    if let Some(token) = &args.auth_token { builder = builder.auth_token(token.as_str()); }
    if let Some(v) = args.timeout { builder = builder.per_call_timeout(Duration::from_secs(v)); }
    if let Some(v) = args.connect_timeout { builder = builder.connect_timeout(Duration::from_secs(v)); }
    if let Some(v) = args.max_in_flight { builder = builder.max_in_flight(v); }
    if let Some(v) = args.dispatch_gap_ms { builder = builder.min_dispatch_gap(Duration::from_millis(v)); }
    if let Some(v) = args.deadline { builder = builder.deadline(Duration::from_secs(v)); }
    if args.insecure { builder = builder.accept_invalid_certs(true); }
    builder.build()
}

async fn run(config: BenchConfig, args: RunArgs) -> anyhow::Result<()> {
    let session = session_from_args(&config, &args).context("invalid benchmark input")?;
    if !args.json {
        println!("Benchmarking {} model(s) at {}", session.models().len(), session.endpoint());
    }
    let stream = bench_core::dispatch(session)?;
    let expected = stream.expected();
    report(stream.into_stream(), expected, args.json, &mut std::io::stdout().lock()).await?;
    Ok(())
}

/// Prints each result as it arrives, then a summary once `Done` is seen.
async fn report<S, W>(mut events: S, expected: usize, json: bool, out: &mut W) -> anyhow::Result<OutcomeSummary>
where
    S: Stream<Item = StreamEvent> + Unpin,
    W: Write,
{
    let started = tokio::time::Instant::now();
    let mut seen = Vec::with_capacity(expected);

    loop {
        match events.next().await {
            Some(StreamEvent::Result(result)) => {
                if json {
                    writeln!(out, "{}", serde_json::to_string(&result)?)?;
                } else {
                    write_result(out, &result)?;
                }
                out.flush()?;
                seen.push(result);
            }
            Some(StreamEvent::Done) => break,
            None => {
                return Err(BenchError::StreamClosed { received: seen.len(), expected })
                    .context("benchmark ended before every model reported");
            }
        }
    }

    let summary = OutcomeSummary::from_results(&seen, started.elapsed());
    if json {
        writeln!(out, "{}", serde_json::json!({ "done": summary }))?;
    } else {
        write_summary(out, &summary)?;
    }
    Ok(summary)
}

fn write_result(out: &mut impl Write, result: &CallResult) -> std::io::Result<()> {
    let outcome = if result.status().is_success() { "Success".to_string() } else { format!("Failed ({})", result.status()) };
    writeln!(out)?;
    writeln!(out, "Model:         {}", result.model())?;
    writeln!(out, "Status:        {outcome}")?;
    writeln!(out, "Response Time: {:.2}s", result.latency().as_secs_f64())?;
    writeln!(out, "Response:")?;
    for line in result.response_text().lines() {
        writeln!(out, "  {line}")?;
    }
    Ok(())
}

fn write_summary(out: &mut impl Write, summary: &OutcomeSummary) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{} of {} succeeded in {:.2}s",
        summary.succeeded,
        summary.total,
        Duration::from_millis(summary.elapsed_ms).as_secs_f64()
    )?;
    if let (Some(model), Some(ms)) = (&summary.fastest_model, summary.fastest_latency_ms) {
        writeln!(out, "fastest: {model} ({:.2}s)", Duration::from_millis(ms).as_secs_f64())?;
    }
    Ok(())
}

async fn serve(config: BenchConfig, args: ServeArgs) -> anyhow::Result<()> {
    let listen = args.listen.unwrap_or_else(|| config.listen.clone());
    let listener = tokio::net::TcpListener::bind(&listen).await.with_context(|| format!("binding {listen}"))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(config)).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn mock(args: MockArgs) -> anyhow::Result<()> {
    let backend = args
        .scripts
        .into_iter()
        .fold(MockBackend::new().fallback(args.fallback), |backend, (model, behavior)| backend.script(model, behavior));
    let listener = tokio::net::TcpListener::bind(&args.listen).await.with_context(|| format!("binding {}", args.listen))?;
    tracing::info!(target: "mock", "mock backend on http://{}", listener.local_addr()?);
    axum::serve(listener, backend.router()).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // results go to stdout, diagnostics to stderr
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let mut otlp_error = None;
    let otlp_layer = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok().and_then(|endpoint| {
        opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint.clone()))
            .install_simple()
            .map_err(|err| otlp_error = Some((endpoint, err)))
            .ok()
            .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer))
    });

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).with(otlp_layer).init();

    if let Some((endpoint, err)) = otlp_error {
        tracing::warn!(%endpoint, "OTLP exporter disabled: {err}");
    }
}
