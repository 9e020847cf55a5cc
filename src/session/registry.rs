//! Session registry: the id → session mapping.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use super::{OutputSink, Session, SessionId, SessionOptions};
use crate::error::MuxError;
use crate::pty::{Geometry, ShellCommand};
use crate::resize::ResizeTarget;
use crate::Result;

/// Thread-safe owner of every live session.
///
/// The map lock is only held for lookups, inserts and removals. Sessions are
/// handed out as `Arc`s so PTY operations run without it.
pub struct SessionRegistry {
    command: ShellCommand,
    options: SessionOptions,
    sessions: RwLock<BTreeMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry whose sessions run `command`.
    pub fn new(command: ShellCommand, options: SessionOptions) -> Self {
        Self {
            command,
            options,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn command(&self) -> &ShellCommand {
        &self.command
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<SessionId, Arc<Session>>>> {
        self.sessions.read().map_err(|_| MuxError::LockPoisoned)
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<SessionId, Arc<Session>>>> {
        self.sessions.write().map_err(|_| MuxError::LockPoisoned)
    }

    /// Spawn a shell in a new PTY and register it.
    ///
    /// Output is buffered until a sink subscribes.
    pub fn open_session(&self, geometry: Geometry) -> Result<SessionId> {
        self.open(geometry, None)
    }

    /// Like [`open_session`](Self::open_session), with `sink` attached before
    /// the shell can produce any output.
    pub fn open_session_with_sink(&self, geometry: Geometry, sink: OutputSink) -> Result<SessionId> {
        self.open(geometry, Some(sink))
    }

    fn open(&self, geometry: Geometry, sink: Option<OutputSink>) -> Result<SessionId> {
        geometry.validate()?;
        let id = SessionId::new();
        let session = Session::create(id, &self.command, geometry, &self.options, sink)?;

        let mut sessions = self.write_lock()?;
        sessions.insert(id, Arc::new(session));
        info!(session = %id, %geometry, "session opened");
        Ok(id)
    }

    /// Get a live session, pruning it if it has ended on its own.
    fn lookup(&self, id: SessionId) -> Result<Arc<Session>> {
        let session = self
            .read()?
            .get(&id)
            .cloned()
            .ok_or(MuxError::NotFound(id))?;

        if session.is_terminated() {
            let removed = self.write_lock()?.remove(&id);
            if removed.is_some() {
                debug!(session = %id, cause = ?session.end_cause(), "pruned ended session");
            }
            return Err(MuxError::NotFound(id));
        }
        Ok(session)
    }

    /// Remove a session and tear it down.
    ///
    /// A session that already ended is removed as well, but reported as
    /// [`MuxError::NotFound`].
    pub async fn close_session(&self, id: SessionId) -> Result<()> {
        let session = self.write_lock()?.remove(&id).ok_or(MuxError::NotFound(id))?;
        if session.is_terminated() {
            return Err(MuxError::NotFound(id));
        }
        session.terminate().await;
        info!(session = %id, "session closed");
        Ok(())
    }

    /// Send input bytes to a session's shell.
    pub async fn write(&self, id: SessionId, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let session = self.lookup(id)?;
        session.submit_input(bytes).await.map_err(|e| not_found(id, e))
    }

    /// Resize a session's PTY immediately.
    pub async fn resize(&self, id: SessionId, geometry: Geometry) -> Result<()> {
        geometry.validate()?;
        let session = self.lookup(id)?;
        session
            .request_resize(geometry)
            .await
            .map_err(|e| not_found(id, e))
    }

    /// Route a session's events to `sink`, replacing the previous sink.
    pub fn subscribe(&self, id: SessionId, sink: OutputSink) -> Result<()> {
        self.lookup(id)?.subscribe(sink);
        Ok(())
    }

    /// The geometry currently applied to a session.
    pub fn geometry(&self, id: SessionId) -> Result<Geometry> {
        Ok(self.lookup(id)?.geometry())
    }

    /// Process ID of a session's shell.
    pub fn pid(&self, id: SessionId) -> Result<Option<u32>> {
        Ok(self.lookup(id)?.pid())
    }

    /// Live session IDs in creation order. Ended sessions are pruned.
    pub fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let ended: Vec<Arc<Session>> = {
            let mut sessions = self.write_lock()?;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.is_terminated())
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &ended {
            debug!(session = %session.id(), cause = ?session.end_cause(), "pruned ended session");
        }
        drop(ended);

        Ok(self.read()?.keys().copied().collect())
    }

    /// Number of registered sessions, including ended ones not yet pruned.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Close every session. Used at shutdown.
    pub async fn close_all(&self) -> Result<usize> {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.write_lock()?;
            std::mem::take(&mut *map).into_values().collect()
        };
        let count = sessions.len();
        for session in sessions {
            session.terminate().await;
        }
        if count > 0 {
            info!(count, "closed all sessions");
        }
        Ok(count)
    }
}

/// A session whose queue shut down mid-call no longer exists for the caller.
fn not_found(id: SessionId, err: MuxError) -> MuxError {
    match err {
        MuxError::Terminated => MuxError::NotFound(id),
        other => other,
    }
}

impl ResizeTarget for SessionRegistry {
    fn current_geometry(&self, id: SessionId) -> Result<Geometry> {
        self.geometry(id)
    }

    fn apply_resize(
        &self,
        id: SessionId,
        geometry: Geometry,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        self.resize(id, geometry)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("command", &self.command)
            .field("sessions", &self.count())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::session::event_channel;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            ShellCommand::new("/bin/sh").env("TERM", "xterm-256color"),
            SessionOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_open_and_list() {
        let registry = registry();
        let first = registry.open_session(Geometry::default()).unwrap();
        let second = registry.open_session(Geometry::default()).unwrap();

        assert_eq!(registry.list_sessions().unwrap(), vec![first, second]);
        assert_eq!(registry.count(), 2);
        assert!(registry.pid(first).unwrap().is_some());

        registry.close_all().await.unwrap();
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_close_nonexistent() {
        let registry = registry();
        let fake_id = SessionId::from_raw(999999);

        let err = registry.close_session(fake_id).await.unwrap_err();
        assert!(matches!(err, MuxError::NotFound(id) if id == fake_id));
    }

    #[tokio::test]
    async fn test_operations_on_unknown_session() {
        let registry = registry();
        let fake_id = SessionId::from_raw(999998);
        let (sink, _events) = event_channel();

        assert!(registry.write(fake_id, "ls\n").await.unwrap_err().is_not_found());
        assert!(registry
            .resize(fake_id, Geometry::default())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(registry.subscribe(fake_id, sink).unwrap_err().is_not_found());
        assert!(registry.geometry(fake_id).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_geometry() {
        let registry = registry();
        let err = registry
            .open_session(Geometry { rows: 0, cols: 80 })
            .unwrap_err();

        assert!(matches!(err, MuxError::InvalidGeometry { rows: 0, cols: 80 }));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_registers_nothing() {
        let registry = SessionRegistry::new(
            ShellCommand::new("/nonexistent/shell-binary"),
            SessionOptions::default(),
        );
        let err = registry.open_session(Geometry::default()).unwrap_err();

        assert!(matches!(err, MuxError::Spawn(_)));
        assert!(registry.list_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_twice() {
        let registry = registry();
        let id = registry.open_session(Geometry::default()).unwrap();

        registry.close_session(id).await.unwrap();
        assert!(registry.close_session(id).await.unwrap_err().is_not_found());
        assert!(registry.list_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resize_updates_geometry() {
        let registry = registry();
        let id = registry.open_session(Geometry::default()).unwrap();
        let target = Geometry::new(40, 120).unwrap();

        registry.resize(id, target).await.unwrap();
        assert_eq!(registry.geometry(id).unwrap(), target);

        let err = registry
            .resize(id, Geometry { rows: 0, cols: 10 })
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidGeometry { .. }));
        assert_eq!(registry.geometry(id).unwrap(), target);

        registry.close_session(id).await.unwrap();
    }
}
