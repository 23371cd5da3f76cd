//! Bounded, non-blocking hand-off between producers and the export worker.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::telemetry::encoding::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue at capacity; the span was dropped.
    Full,
    /// The worker is gone; the span was dropped.
    Closed,
}

/// Producer side of the export queue.
#[derive(Debug, Clone)]
pub struct SpanQueue {
    sender: mpsc::Sender<Span>,
    capacity: usize,
}

impl SpanQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Span>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, capacity }, receiver)
    }

    /// Enqueue without waiting.
    pub fn try_enqueue(&self, span: Span) -> Result<(), EnqueueError> {
        self.sender.try_send(span).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Spans currently waiting for the worker.
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
