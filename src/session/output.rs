//! Per-session output routing.
//!
//! Every chunk the reader produces and the final end notification pass
//! through one lock here, which gives three guarantees: chunks reach the sink
//! in read order, a sink swap never splits a chunk between two sinks, and no
//! chunk is delivered after the session ended.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{EndCause, OutputChunk, SessionEvent, SessionId};

/// Where a session's events go.
pub type OutputSink = mpsc::UnboundedSender<SessionEvent>;

/// Receiving half paired with an [`OutputSink`].
pub type EventStream = mpsc::UnboundedReceiver<SessionEvent>;

/// Create a connected sink and stream.
pub fn event_channel() -> (OutputSink, EventStream) {
    mpsc::unbounded_channel()
}

#[derive(Default)]
struct RouteState {
    sink: Option<OutputSink>,
    pending: VecDeque<SessionEvent>,
    pending_bytes: usize,
}

impl RouteState {
    /// Hand `event` to the sink, or park it if there is none (or it hung up).
    fn push(&mut self, event: SessionEvent, max_pending: usize) {
        let event = match &self.sink {
            Some(sink) => match sink.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => {
                    debug!("output sink closed, buffering until resubscribed");
                    self.sink = None;
                    event
                }
            },
            None => event,
        };

        self.pending_bytes += event.output_len();
        self.pending.push_back(event);

        while self.pending_bytes > max_pending {
            let Some(pos) = self
                .pending
                .iter()
                .position(|e| matches!(e, SessionEvent::Output(_)))
            else {
                break;
            };
            if let Some(dropped) = self.pending.remove(pos) {
                self.pending_bytes -= dropped.output_len();
                trace!(bytes = dropped.output_len(), "dropped buffered output");
            }
        }
    }
}

pub(crate) struct OutputRoute {
    id: SessionId,
    max_pending: usize,
    state: Mutex<RouteState>,
    end: OnceLock<EndCause>,
}

impl OutputRoute {
    pub(crate) fn new(id: SessionId, sink: Option<OutputSink>, max_pending: usize) -> Self {
        Self {
            id,
            max_pending,
            state: Mutex::new(RouteState {
                sink,
                ..RouteState::default()
            }),
            end: OnceLock::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a chunk. Returns `false` once the session has ended.
    pub(crate) fn deliver(&self, bytes: Vec<u8>) -> bool {
        let mut state = self.lock();
        if self.end.get().is_some() {
            return false;
        }
        state.push(
            SessionEvent::Output(OutputChunk {
                session_id: self.id,
                bytes,
            }),
            self.max_pending,
        );
        true
    }

    /// Mark the session ended and emit the end notification.
    ///
    /// Only the first call has any effect; it returns `true`.
    pub(crate) fn end(&self, cause: EndCause) -> bool {
        let mut state = self.lock();
        if self.end.set(cause.clone()).is_err() {
            return false;
        }
        debug!(session = %self.id, ?cause, "session ended");
        state.push(
            SessionEvent::SessionEnded {
                session_id: self.id,
                cause,
            },
            self.max_pending,
        );
        true
    }

    /// Replace the sink, first flushing anything buffered to it.
    pub(crate) fn subscribe(&self, sink: OutputSink) {
        let mut state = self.lock();
        state.sink = Some(sink);
        state.pending_bytes = 0;
        let pending = std::mem::take(&mut state.pending);
        for event in pending {
            state.push(event, self.max_pending);
        }
    }

    pub(crate) fn end_cause(&self) -> Option<&EndCause> {
        self.end.get()
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.end.get().is_some()
    }
}
