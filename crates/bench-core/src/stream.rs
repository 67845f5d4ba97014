use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

use bench_common::{BenchError, Result};

use crate::result::{BenchmarkOutcome, CallResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Result(CallResult),
    /// Sent once, after every result of the session.
    Done,
}

/// Consumer half: results in completion order, then [`StreamEvent::Done`].
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::Receiver<StreamEvent>,
    expected: usize,
    started: Instant,
    finished: bool,
}

/// Producer half, owned by the dispatch coordinator.
#[derive(Debug)]
pub(crate) struct ResultSink {
    tx: mpsc::Sender<StreamEvent>,
}

pub(crate) fn channel(expected: usize) -> (ResultSink, ResultStream) {
    // room for every result plus the terminal marker, so the producer never waits on the consumer
    let (tx, rx) = mpsc::channel(expected + 1);
    let stream = ResultStream { rx, expected, started: Instant::now(), finished: false };
    (ResultSink { tx }, stream)
}

impl ResultSink {
    /// Returns false once the consumer has gone away.
    pub(crate) async fn publish(&self, result: CallResult) -> bool {
        self.tx.send(StreamEvent::Result(result)).await.is_ok()
    }

    /// Resolves once the consumer has dropped its [`ResultStream`].
    pub(crate) async fn closed(&self) {
        self.tx.closed().await
    }

    pub(crate) async fn done(self) {
        let _ = self.tx.send(StreamEvent::Done).await;
    }
}

impl ResultStream {
    /// Number of results the session will produce.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Next event; `None` after `Done` or if the producer vanished.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        if matches!(event, Some(StreamEvent::Done) | None) {
            self.finished = true;
        }
        event
    }

    /// Drains everything up to `Done` into an outcome.
    pub async fn collect(mut self) -> Result<BenchmarkOutcome> {
        let mut results = Vec::with_capacity(self.expected);
        loop {
            match self.next().await {
                Some(StreamEvent::Result(r)) => results.push(r),
                Some(StreamEvent::Done) => break,
                None => {
                    return Err(BenchError::StreamClosed { received: results.len(), expected: self.expected });
                }
            }
        }
        Ok(BenchmarkOutcome::new(results, self.started.elapsed()))
    }

    pub fn into_stream(self) -> ReceiverStream<StreamEvent> {
        ReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn collect_fails_if_producer_vanishes_before_done() {
        let (sink, stream) = channel(2);
        assert!(sink.publish(CallResult::success(0, "a", "x", Duration::ZERO)).await);
        drop(sink);
        let err = stream.collect().await.unwrap_err();
        assert!(matches!(err, BenchError::StreamClosed { received: 1, expected: 2 }));
    }

    #[tokio::test]
    async fn closed_resolves_when_consumer_drops() {
        let (sink, stream) = channel(1);
        drop(stream);
        tokio::time::timeout(Duration::from_millis(100), sink.closed()).await.unwrap();
        assert!(!sink.publish(CallResult::success(0, "a", "x", Duration::ZERO)).await);
    }

    #[tokio::test]
    async fn next_returns_none_after_done() {
        let (sink, mut stream) = channel(1);
        sink.publish(CallResult::success(0, "a", "x", Duration::ZERO)).await;
        sink.done().await;
        assert!(matches!(stream.next().await, Some(StreamEvent::Result(_))));
        assert_eq!(stream.next().await, Some(StreamEvent::Done));
        assert_eq!(stream.next().await, None);
    }
}
