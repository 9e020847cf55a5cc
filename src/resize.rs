//! Resize coalescing.
//!
//! A display surface can report a new size many times while the user drags a
//! window edge. Only the latest size for each session matters, so requests
//! feed a per-session `watch` channel and a short-lived worker applies
//! whatever value is current when it gets to run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::pty::Geometry;
use crate::session::SessionId;
use crate::Result;

/// Default wait before a coalesced resize is applied.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(16);

/// Something whose sessions can be resized.
pub trait ResizeTarget: Send + Sync + 'static {
    /// Geometry currently applied to the session, or `NotFound`.
    fn current_geometry(&self, id: SessionId) -> Result<Geometry>;

    /// Apply `geometry` to the session.
    fn apply_resize(
        &self,
        id: SessionId,
        geometry: Geometry,
    ) -> impl Future<Output = Result<()>> + Send;
}

type PendingMap = HashMap<SessionId, watch::Sender<Geometry>>;

/// Collapses bursts of resize requests into the most recent one per session.
pub struct ResizeCoordinator<T: ResizeTarget> {
    target: Arc<T>,
    debounce: Duration,
    pending: Arc<Mutex<PendingMap>>,
}

impl<T: ResizeTarget> ResizeCoordinator<T> {
    pub fn new(target: Arc<T>, debounce: Duration) -> Self {
        Self {
            target,
            debounce,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue a resize, superseding any not yet applied for the same session.
    ///
    /// Validation and the existence check happen here; failures while
    /// applying are logged because there is no caller left to receive them.
    /// Must be called from within a Tokio runtime.
    pub fn request(&self, id: SessionId, geometry: Geometry) -> Result<()> {
        geometry.validate()?;
        self.target.current_geometry(id)?;

        let mut pending = lock(&self.pending);
        if let Some(tx) = pending.get(&id) {
            if tx.send(geometry).is_ok() {
                trace!(session = %id, %geometry, "resize superseded pending request");
                return Ok(());
            }
        }

        let (tx, rx) = watch::channel(geometry);
        pending.insert(id, tx);
        tokio::spawn(apply_latest(
            id,
            rx,
            Arc::clone(&self.target),
            Arc::clone(&self.pending),
            self.debounce,
        ));
        Ok(())
    }

    /// Drop any pending resize for a closed session.
    pub fn forget(&self, id: SessionId) {
        if lock(&self.pending).remove(&id).is_some() {
            debug!(session = %id, "dropped pending resize");
        }
    }

    /// Number of sessions with a resize in flight.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn lock(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply the newest geometry until no request arrived during the last apply.
async fn apply_latest<T: ResizeTarget>(
    id: SessionId,
    mut rx: watch::Receiver<Geometry>,
    target: Arc<T>,
    pending: Arc<Mutex<PendingMap>>,
    debounce: Duration,
) {
    loop {
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }
        let geometry = *rx.borrow_and_update();

        match target.current_geometry(id) {
            Ok(current) if current == geometry => {
                trace!(session = %id, %geometry, "resize skipped: already applied");
            }
            Ok(_) => {
                if let Err(e) = target.apply_resize(id, geometry).await {
                    if e.is_not_found() {
                        break;
                    }
                    warn!(session = %id, %geometry, error = %e, "coalesced resize failed");
                }
            }
            Err(e) if e.is_not_found() => break,
            Err(e) => warn!(session = %id, error = %e, "coalesced resize failed"),
        }

        // Requests send under this lock, so checking here cannot miss one.
        let more = {
            let mut map = lock(&pending);
            match rx.has_changed() {
                Ok(true) => true,
                Ok(false) => {
                    map.remove(&id);
                    false
                }
                // forget() dropped our sender; the entry, if any, is a newer worker's.
                Err(_) => false,
            }
        };
        if !more {
            return;
        }
    }

    debug!(session = %id, "resize target gone");
    let mut map = lock(&pending);
    if rx.has_changed().is_ok() {
        map.remove(&id);
    }
}
