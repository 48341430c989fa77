//! Cancellable stream of specialist results
//!
//! A [`SpecialistStream`] yields zero or more `PARTIAL` results followed by
//! exactly one terminal result, then ends. It is fed by a producer task
//! through a bounded channel. Cancelling or dropping the stream cancels the
//! producer, which drops the in-flight HTTP request.

use futures::Stream;
use sdk::errors::SpecialistError;
use sdk::types::{SpecialistKind, SpecialistResult};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Default channel capacity between producer and consumer
pub const STREAM_CAPACITY: usize = 16;

/// Producer half of a [`SpecialistStream`]
pub struct StreamProducer {
    tx: mpsc::Sender<SpecialistResult>,
    cancel: CancellationToken,
}

impl StreamProducer {
    /// Push a result to the consumer
    ///
    /// Returns false once the consumer is gone or has cancelled.
    pub async fn send(&self, result: SpecialistResult) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(result).await.is_ok()
    }

    /// Resolves when the consumer cancels or drops the stream
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token shared with the consumer
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Ordered, finite, cancellable sequence of results from one specialist call
pub struct SpecialistStream {
    specialist: SpecialistKind,
    rx: mpsc::Receiver<SpecialistResult>,
    cancel: CancellationToken,
    finished: bool,
}

impl SpecialistStream {
    /// Create a connected producer/consumer pair
    pub fn channel(specialist: SpecialistKind, capacity: usize) -> (StreamProducer, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let producer = StreamProducer {
            tx,
            cancel: cancel.clone(),
        };
        let stream = Self {
            specialist,
            rx,
            cancel,
            finished: false,
        };
        (producer, stream)
    }

    /// A stream that yields the given results in order
    ///
    /// A terminal result is appended if the list does not end with one.
    pub fn from_results(specialist: SpecialistKind, results: Vec<SpecialistResult>) -> Self {
        let (producer, stream) = Self::channel(specialist, results.len() + 1);
        let ends_terminal = results.last().is_some_and(|r| r.status.is_terminal());
        for result in results {
            let _ = producer.tx.try_send(result);
        }
        if !ends_terminal {
            let _ = producer.tx.try_send(SpecialistResult::failed(
                specialist,
                SpecialistError::protocol("stream ended before a terminal result"),
            ));
        }
        stream
    }

    pub fn specialist(&self) -> SpecialistKind {
        self.specialist
    }

    /// Abort the call and produce the terminal `CANCELLED` result
    ///
    /// After this the stream yields nothing further.
    pub fn cancel(&mut self) -> SpecialistResult {
        self.cancel.cancel();
        self.finished = true;
        self.rx.close();
        tracing::debug!("Cancelled {} specialist stream", self.specialist);
        SpecialistResult::cancelled(self.specialist)
    }

    /// Drain the stream and return its terminal result
    pub async fn final_result(mut self) -> SpecialistResult {
        use futures::StreamExt;

        let mut last = None;
        while let Some(result) = self.next().await {
            last = Some(result);
        }
        last.unwrap_or_else(|| SpecialistResult::cancelled(self.specialist))
    }
}

impl Stream for SpecialistStream {
    type Item = SpecialistResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(result)) => {
                if result.status.is_terminal() {
                    this.finished = true;
                    this.rx.close();
                }
                Poll::Ready(Some(result))
            }
            Poll::Ready(None) => {
                // Producer went away without a terminal result
                this.finished = true;
                Poll::Ready(Some(SpecialistResult::failed(
                    this.specialist,
                    SpecialistError::transport("specialist stream closed unexpectedly"),
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SpecialistStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
