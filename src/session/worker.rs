//! The per-session operation queue.
//!
//! One blocking task owns the [`PtyHandle`] and applies operations strictly
//! in the order they were queued, so writes and resizes for a session are
//! totally ordered. The reader's completion goes through the same queue.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::output::OutputRoute;
use super::{EndCause, SessionId};
use crate::pty::{Geometry, PtyHandle, ReadOutcome};
use crate::Result;

/// How long to wait for the exit status after the output stream ended.
const EXIT_REAP_BUDGET: Duration = Duration::from_millis(500);

pub(crate) enum PtyOp {
    Write {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    Resize {
        geometry: Geometry,
        reply: oneshot::Sender<Result<()>>,
    },
    ReaderFinished(ReadOutcome),
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// State shared between a session's handle, worker and reader.
pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) output: OutputRoute,
    geometry: Mutex<Geometry>,
}

impl SessionShared {
    pub(crate) fn new(id: SessionId, geometry: Geometry, output: OutputRoute) -> Self {
        Self {
            id,
            output,
            geometry: Mutex::new(geometry),
        }
    }

    pub(crate) fn geometry(&self) -> Geometry {
        *self.geometry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_geometry(&self, geometry: Geometry) {
        *self.geometry.lock().unwrap_or_else(PoisonError::into_inner) = geometry;
    }
}

pub(crate) fn spawn(
    pty: PtyHandle,
    shared: Arc<SessionShared>,
    ops: mpsc::UnboundedReceiver<PtyOp>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || run(pty, shared, ops))
}

fn run(mut pty: PtyHandle, shared: Arc<SessionShared>, mut ops: mpsc::UnboundedReceiver<PtyOp>) {
    let id = shared.id;
    debug!(session = %id, "session worker started");

    while let Some(op) = ops.blocking_recv() {
        match op {
            PtyOp::Write { bytes, reply } => {
                trace!(session = %id, "PTY writer: writing {} bytes", bytes.len());
                let _ = reply.send(pty.write(&bytes));
            }
            PtyOp::Resize { geometry, reply } => {
                let result = pty.resize(geometry);
                match &result {
                    Ok(()) => {
                        shared.set_geometry(geometry);
                        debug!(session = %id, %geometry, "PTY resized");
                    }
                    Err(e) => warn!(session = %id, %geometry, error = %e, "PTY resize failed"),
                }
                let _ = reply.send(result);
            }
            PtyOp::ReaderFinished(ReadOutcome::Stopped) => {
                // The session already ended; a Close is on its way.
                continue;
            }
            PtyOp::ReaderFinished(outcome) => {
                let cause = match outcome {
                    ReadOutcome::Failed(e) => EndCause::Failed {
                        error: e.to_string(),
                    },
                    _ => EndCause::from_exit(pty.reap(EXIT_REAP_BUDGET)),
                };
                shared.output.end(cause);
                pty.close();
                debug!(session = %id, "session worker stopped after reader finished");
                return;
            }
            PtyOp::Close { reply } => {
                pty.close();
                let _ = reply.send(());
                debug!(session = %id, "session worker closed");
                return;
            }
        }
    }

    // Every handle to the session is gone.
    shared.output.end(EndCause::Closed);
    pty.close();
    debug!(session = %id, "session worker stopped: queue dropped");
}
