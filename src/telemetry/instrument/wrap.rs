//! Higher-order wrappers that record a call around its execution.
//!
//! The wrapped call's output and error pass through untouched. A session that
//! cannot take the events (ended, or none at all) only costs the recording:
//! the call still runs. The one error the wrappers add is an ambiguous
//! session, reported before the call runs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::TelemetryError;
use crate::telemetry::events::Event;
use crate::telemetry::instrument::adapter::CallAdapter;
use crate::telemetry::sessions::{Client, Session};

const STREAM_CHUNKS_PARAM: &str = "stream_chunks";
const STREAM_CANCELLED_PARAM: &str = "stream_cancelled";

#[derive(Debug, Error)]
pub enum InstrumentError<E> {
    /// Several sessions were active and none was in scope; the call was not run.
    #[error("{0}")]
    Session(TelemetryError),
    /// The call's own error, unchanged.
    #[error("{0}")]
    Call(E),
}

impl<E> InstrumentError<E> {
    pub fn into_call_error(self) -> Option<E> {
        match self {
            InstrumentError::Call(err) => Some(err),
            InstrumentError::Session(_) => None,
        }
    }

    pub fn session_error(&self) -> Option<&TelemetryError> {
        match self {
            InstrumentError::Session(err) => Some(err),
            InstrumentError::Call(_) => None,
        }
    }
}

/// Record the open event. A session that no longer accepts events leaves the
/// call to run unrecorded.
fn begin(session: &Session, started: &Event) -> bool {
    match session.try_record(started.clone()) {
        Ok(()) => true,
        Err(err) => {
            warn!(session_id = %session.id(), error = %err, "Running call without recording it");
            false
        }
    }
}

/// Run `call` recorded into `session`: an open event before, its completion
/// after. A failing call records an error event attached to the call's span.
pub fn wrap<A, T, E, Ad, F>(
    session: &Session,
    adapter: &Ad,
    args: A,
    call: F,
) -> Result<T, InstrumentError<E>>
where
    Ad: CallAdapter<A, T> + ?Sized,
    F: FnOnce(A) -> Result<T, E>,
    E: fmt::Display,
{
    let started = adapter.on_call_start(&args);
    if !begin(session, &started) {
        return call(args).map_err(InstrumentError::Call);
    }

    match session.in_scope(|| call(args)) {
        Ok(output) => {
            session.record(adapter.on_call_end(started, &output));
            Ok(output)
        }
        Err(err) => {
            record_failure(session, adapter.error_type(), started, &err);
            Err(InstrumentError::Call(err))
        }
    }
}

/// Async form of [`wrap`]. The future runs with `session` as the task's
/// current session.
pub async fn wrap_async<A, T, E, Ad, F, Fut>(
    session: &Session,
    adapter: &Ad,
    args: A,
    call: F,
) -> Result<T, InstrumentError<E>>
where
    Ad: CallAdapter<A, T> + ?Sized,
    F: FnOnce(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let started = adapter.on_call_start(&args);
    if !begin(session, &started) {
        return call(args).await.map_err(InstrumentError::Call);
    }

    match session.scope(call(args)).await {
        Ok(output) => {
            session.record(adapter.on_call_end(started, &output));
            Ok(output)
        }
        Err(err) => {
            record_failure(session, adapter.error_type(), started, &err);
            Err(InstrumentError::Call(err))
        }
    }
}

fn record_failure(session: &Session, error_type: &str, started: Event, err: &dyn fmt::Display) {
    session.record(Event::error_in(&started, error_type, err.to_string()));
    session.record(started.end());
}

impl Client {
    /// Resolve the session a handle-less wrapper records into. `Ok(None)`
    /// means there is nothing to record into and the call runs unrecorded.
    fn wrap_target(&self) -> Result<Option<Session>, TelemetryError> {
        match self.current_session() {
            Ok(session) => Ok(Some(session)),
            Err(err @ TelemetryError::AmbiguousSession { .. }) => Err(err),
            Err(err) => {
                debug!(error = %err, "Running call without recording it");
                Ok(None)
            }
        }
    }

    /// [`wrap`] into the current session. With several active sessions and no
    /// scope this fails with `AmbiguousSession` without running the call.
    pub fn wrap<A, T, E, Ad, F>(&self, adapter: &Ad, args: A, call: F) -> Result<T, InstrumentError<E>>
    where
        Ad: CallAdapter<A, T> + ?Sized,
        F: FnOnce(A) -> Result<T, E>,
        E: fmt::Display,
    {
        match self.wrap_target().map_err(InstrumentError::Session)? {
            Some(session) => wrap(&session, adapter, args, call),
            None => call(args).map_err(InstrumentError::Call),
        }
    }

    /// [`wrap_async`] into the current session.
    pub async fn wrap_async<A, T, E, Ad, F, Fut>(
        &self,
        adapter: &Ad,
        args: A,
        call: F,
    ) -> Result<T, InstrumentError<E>>
    where
        Ad: CallAdapter<A, T> + ?Sized,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match self.wrap_target().map_err(InstrumentError::Session)? {
            Some(session) => wrap_async(&session, adapter, args, call).await,
            None => call(args).await.map_err(InstrumentError::Call),
        }
    }
}

/// A stream whose lifetime is recorded as one event: opened when wrapped,
/// completed when the stream ends or is dropped.
pub struct RecordedStream<S> {
    inner: S,
    session: Session,
    event: Option<Event>,
    chunks: u64,
}

/// Record `event` into `session` and complete it when `stream` finishes.
pub fn record_stream<S>(session: &Session, event: Event, stream: S) -> RecordedStream<S>
where
    S: Stream + Unpin,
{
    session.record(event.clone());
    RecordedStream {
        inner: stream,
        session: session.clone(),
        event: Some(event),
        chunks: 0,
    }
}

impl<S> RecordedStream<S> {
    fn finish(&mut self, cancelled: bool) {
        if let Some(event) = self.event.take() {
            let mut event = event.with_param(STREAM_CHUNKS_PARAM, self.chunks);
            if cancelled {
                event = event.with_param(STREAM_CANCELLED_PARAM, true);
            }
            self.session.record(event.end());
        }
    }
}

impl<S> Stream for RecordedStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                this.chunks += 1;
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.finish(false);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for RecordedStream<S> {
    fn drop(&mut self) {
        self.finish(true);
    }
}
