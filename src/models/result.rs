//! Outcome carrier for asynchronous lookups.
//!
//! A lookup runs on its own task and reports back through a single-slot
//! channel. The caller holds a [`PendingResult`] and awaits it like any other
//! future.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::{sync::oneshot, task::JoinHandle};

use crate::models::error::NotificationError;

/// Terminal outcome of one asynchronous operation.
///
/// `Empty` is a successful lookup that matched nothing and is distinct from
/// `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<T> {
    Data(T),
    Count(u64),
    Empty,
    Error(NotificationError),
}

impl<T> QueryResult<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error(_))
    }

    pub fn data(self) -> Option<T> {
        match self {
            QueryResult::Data(data) => Some(data),
            _ => None,
        }
    }
}

/// One-shot handle to a result produced by a background task.
///
/// The producer writes at most once and never blocks on the write. Dropping
/// the handle aborts the producer.
pub struct PendingResult<T> {
    receiver: oneshot::Receiver<QueryResult<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> PendingResult<T> {
    /// Runs `operation` on a new task and returns a handle to its outcome.
    pub fn spawn<F>(operation: F) -> Self
    where
        F: Future<Output = QueryResult<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let worker = tokio::spawn(async move {
            let outcome = operation.await;
            // The receiver may already be gone if the caller gave up.
            let _ = sender.send(outcome);
        });

        Self {
            receiver,
            worker: Some(worker),
        }
    }

    /// Wraps an outcome that is already known.
    pub fn ready(outcome: QueryResult<T>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(outcome);

        Self {
            receiver,
            worker: None,
        }
    }
}

impl<T> Future for PendingResult<T> {
    type Output = QueryResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                self.worker = None;
                Poll::Ready(outcome)
            }
            Poll::Ready(Err(_)) => {
                self.worker = None;
                Poll::Ready(QueryResult::Error(NotificationError::internal(
                    "lookup worker terminated without a result",
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for PendingResult<T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
