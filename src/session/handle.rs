//! A live terminal session: one PTY, its reader, and its operation queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use portable_pty::ChildKiller;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::output::{OutputRoute, OutputSink};
use super::worker::{self, PtyOp, SessionShared};
use super::{EndCause, SessionId};
use crate::error::MuxError;
use crate::pty::{join_reader, Geometry, PtyHandle, SessionReader, ShellCommand};
use crate::Result;

/// Tunables applied to every session a registry creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bytes requested per PTY read.
    pub read_buffer_size: usize,
    /// Output kept while no sink is subscribed; oldest chunks are dropped first.
    pub max_pending_bytes: usize,
    /// How long `terminate` waits for an orderly close before killing the child.
    pub close_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            max_pending_bytes: 1024 * 1024,
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// One PTY + shell pairing, addressable by its [`SessionId`].
pub struct Session {
    shared: Arc<SessionShared>,
    ops: mpsc::UnboundedSender<PtyOp>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    pid: Option<u32>,
    closing: AtomicBool,
    close_timeout: Duration,
}

impl Session {
    /// Spawn `command` in a new PTY and start streaming its output.
    ///
    /// Must be called from within a Tokio runtime. If `sink` is given it
    /// receives every event from the first byte on; otherwise events are
    /// buffered until [`Session::subscribe`].
    pub fn create(
        id: SessionId,
        command: &ShellCommand,
        geometry: Geometry,
        options: &SessionOptions,
        sink: Option<OutputSink>,
    ) -> Result<Self> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            MuxError::Spawn("sessions must be created inside a Tokio runtime".into())
        })?;

        let pty = PtyHandle::open(command, geometry)?;
        let reader = pty
            .take_reader()?
            .with_buffer_size(options.read_buffer_size);
        let killer = pty.clone_killer();
        let pid = pty.pid();

        let shared = Arc::new(SessionShared::new(
            id,
            geometry,
            OutputRoute::new(id, sink, options.max_pending_bytes),
        ));

        let (ops, ops_rx) = mpsc::unbounded_channel();
        worker::spawn(pty, Arc::clone(&shared), ops_rx);

        let route = Arc::clone(&shared);
        let finished = ops.clone();
        let reader = SessionReader::new(reader, id.to_string()).spawn(
            move |bytes| route.output.deliver(bytes),
            move |outcome| {
                let _ = finished.send(PtyOp::ReaderFinished(outcome));
            },
        );

        info!(session = %id, ?pid, %geometry, program = command.program(), "session created");

        Ok(Self {
            shared,
            ops,
            killer: Mutex::new(killer),
            reader: Mutex::new(Some(reader)),
            pid,
            closing: AtomicBool::new(false),
            close_timeout: options.close_timeout,
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Process ID of the shell, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The last geometry successfully applied to the PTY.
    pub fn geometry(&self) -> Geometry {
        self.shared.geometry()
    }

    /// Whether the session has ended, for any reason. Never blocks.
    pub fn is_terminated(&self) -> bool {
        self.shared.output.is_ended()
    }

    /// Why the session ended, once it has.
    pub fn end_cause(&self) -> Option<EndCause> {
        self.shared.output.end_cause().cloned()
    }

    /// Write input bytes to the shell.
    ///
    /// Writes are applied in the order this method is called.
    pub async fn submit_input(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let (reply, result) = oneshot::channel();
        self.enqueue(PtyOp::Write {
            bytes: bytes.into(),
            reply,
        })?;
        result.await.map_err(|_| MuxError::Terminated)?
    }

    /// Resize the PTY. The tracked geometry changes only on success.
    pub async fn request_resize(&self, geometry: Geometry) -> Result<()> {
        geometry.validate()?;
        let (reply, result) = oneshot::channel();
        self.enqueue(PtyOp::Resize { geometry, reply })?;
        result.await.map_err(|_| MuxError::Terminated)?
    }

    /// Route this session's events to `sink`, replacing any previous sink.
    pub fn subscribe(&self, sink: OutputSink) {
        self.shared.output.subscribe(sink);
    }

    fn enqueue(&self, op: PtyOp) -> Result<()> {
        if self.closing.load(Ordering::Acquire) || self.is_terminated() {
            return Err(MuxError::Terminated);
        }
        self.ops.send(op).map_err(|_| MuxError::Terminated)
    }

    /// Stop the reader and close the PTY. Idempotent.
    ///
    /// Emits `SessionEnded(Closed)` unless the session already ended.
    pub async fn terminate(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        let id = self.id();
        self.shared.output.end(EndCause::Closed);

        let (reply, closed) = oneshot::channel();
        if self.ops.send(PtyOp::Close { reply }).is_ok()
            && tokio::time::timeout(self.close_timeout, closed).await.is_err()
        {
            warn!(session = %id, "session worker did not close in time, killing child");
            self.kill();
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            if tokio::time::timeout(self.close_timeout, join_reader(reader))
                .await
                .is_err()
            {
                warn!(session = %id, "PTY reader still blocked after close");
            }
        }
        debug!(session = %id, "session terminated");
    }

    fn kill(&self) {
        let mut killer = self.killer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = killer.kill() {
            debug!(session = %self.id(), error = %e, "kill failed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The reader keeps the worker's queue alive, so a live child has to go.
        // If the session already ended, the worker has reaped the child and
        // its pid may belong to another process by now.
        if !self.closing.swap(true, Ordering::AcqRel) && self.shared.output.end(EndCause::Closed) {
            self.kill();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("pid", &self.pid)
            .field("geometry", &self.geometry())
            .field("end_cause", &self.end_cause())
            .finish_non_exhaustive()
    }
}
