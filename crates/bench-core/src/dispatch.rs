use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bench_common::Result;
use futures::stream::{FuturesUnordered, StreamExt as _};
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};

use crate::executor::{CallExecutor, HttpExecutor};
use crate::result::CallResult;
use crate::session::Session;
use crate::stream::{self, ResultSink, ResultStream};

/// Fans a session out to one task per model and fans the results back in.
#[derive(Debug)]
pub struct Dispatcher<E = HttpExecutor> {
    executor: Arc<E>,
}

impl<E> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self { executor: Arc::clone(&self.executor) }
    }
}

impl Dispatcher<HttpExecutor> {
    pub fn for_session(session: &Session) -> Result<Self> {
        Ok(Self::new(HttpExecutor::for_session(session)?))
    }
}

impl<E: CallExecutor> Dispatcher<E> {
    pub fn new(executor: E) -> Self {
        Self { executor: Arc::new(executor) }
    }

    /// Starts the session in the background and hands back its result stream.
    ///
    /// Must be called from within a Tokio runtime. Nothing is dispatched if the
    /// session fails validation.
    pub fn dispatch(&self, session: Session) -> Result<ResultStream> {
        session.validate()?;
        let (sink, stream) = stream::channel(session.models().len());
        tracing::info!(
            target: "dispatch",
            endpoint = %session.endpoint(),
            models = session.models().len(),
            max_in_flight = ?session.policy().max_in_flight,
            "dispatching session"
        );
        tokio::spawn(coordinate(Arc::clone(&self.executor), Arc::new(session), sink));
        Ok(stream)
    }
}

/// Builds an HTTP dispatcher for the session and starts it.
pub fn dispatch(session: Session) -> Result<ResultStream> {
    Dispatcher::for_session(&session)?.dispatch(session)
}

struct InFlight {
    model: String,
    started: Instant,
    abort: AbortHandle,
}

async fn coordinate<E: CallExecutor>(executor: Arc<E>, session: Arc<Session>, sink: ResultSink) {
    let started = Instant::now();
    let policy = session.policy().clone();
    let max_in_flight = policy.max_in_flight.unwrap_or(usize::MAX);
    let gap = policy.min_dispatch_gap.unwrap_or(Duration::ZERO);
    let deadline_at = policy.deadline.map(|d| started + d);

    let mut queue: VecDeque<(usize, String)> = session.models().iter().cloned().enumerate().collect();
    let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
    let mut running = FuturesUnordered::new();
    let mut next_dispatch = started;
    let mut delivered = 0usize;

    loop {
        if queue.is_empty() && in_flight.is_empty() {
            break;
        }
        let can_admit = !queue.is_empty() && in_flight.len() < max_in_flight;

        tokio::select! {
            biased;

            _ = sleep_until(deadline_at.unwrap_or(started)), if deadline_at.is_some() => {
                let expired = expire_outstanding(&mut queue, &mut in_flight);
                tracing::warn!(target: "dispatch", outstanding = expired.len(), "session deadline reached");
                for result in expired {
                    if !sink.publish(result).await {
                        return;
                    }
                    delivered += 1;
                }
                break;
            }

            _ = sink.closed() => {
                tracing::debug!(target: "dispatch", outstanding = in_flight.len() + queue.len(), "result stream dropped, cancelling outstanding calls");
                abort_all(&mut in_flight);
                return;
            }

            Some((index, joined)) = running.next(), if !running.is_empty() => {
                let Some(call) = in_flight.remove(&index) else { continue };
                let result = match joined {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(target: "dispatch", model = %call.model, index, "call task failed: {err}");
                        CallResult::connect_error(index, call.model, format!("call aborted: {err}"), call.started.elapsed())
                    }
                };
                if !sink.publish(result).await {
                    tracing::debug!(target: "dispatch", "result stream dropped, cancelling outstanding calls");
                    abort_all(&mut in_flight);
                    return;
                }
                delivered += 1;
            }

            _ = sleep_until(next_dispatch), if can_admit => {
                let Some((index, model)) = queue.pop_front() else { continue };
                let task_executor = Arc::clone(&executor);
                let task_session = Arc::clone(&session);
                let task_model = model.clone();
                let handle = tokio::spawn(async move {
                    task_executor.execute(&task_session, index, &task_model).await
                });
                tracing::debug!(target: "dispatch", model = %model, index, "call admitted");
                in_flight.insert(index, InFlight { model, started: Instant::now(), abort: handle.abort_handle() });
                running.push(async move { (index, handle.await) });
                next_dispatch = Instant::now() + gap;
            }

            else => break,
        }
    }

    tracing::info!(
        target: "dispatch",
        delivered,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "session complete"
    );
    sink.done().await;
}

/// Cancels every in-flight call and turns it, and every queued call, into a timeout result.
fn expire_outstanding(queue: &mut VecDeque<(usize, String)>, in_flight: &mut HashMap<usize, InFlight>) -> Vec<CallResult> {
    let mut expired: Vec<CallResult> = in_flight
        .drain()
        .map(|(index, call)| {
            call.abort.abort();
            CallResult::timeout(index, call.model, "session deadline reached before the call completed", call.started.elapsed())
        })
        .collect();
    expired.extend(
        queue
            .drain(..)
            .map(|(index, model)| CallResult::timeout(index, model, "session deadline reached before the call was dispatched", Duration::ZERO)),
    );
    expired.sort_by_key(CallResult::index);
    expired
}

fn abort_all(in_flight: &mut HashMap<usize, InFlight>) {
    for (_, call) in in_flight.drain() {
        call.abort.abort();
    }
}
