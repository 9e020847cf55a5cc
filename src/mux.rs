//! The multiplexer a presentation layer owns.
//!
//! It ties the registry and the resize coordinator together and funnels the
//! events of every session into one stream.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{Config, ConfigError};
use crate::message::{Request, Response};
use crate::pty::{Geometry, ShellCommand};
use crate::resize::ResizeCoordinator;
use crate::session::{event_channel, EventStream, OutputSink, SessionId, SessionOptions, SessionRegistry};
use crate::Result;

/// Session manager for one display surface.
pub struct Multiplexer {
    registry: Arc<SessionRegistry>,
    resizer: ResizeCoordinator<SessionRegistry>,
    events: OutputSink,
    default_geometry: Geometry,
}

impl Multiplexer {
    /// Create a multiplexer and the stream all session events arrive on.
    pub fn new(
        command: ShellCommand,
        options: SessionOptions,
        resize_debounce: Duration,
    ) -> (Self, EventStream) {
        let registry = Arc::new(SessionRegistry::new(command, options));
        let resizer = ResizeCoordinator::new(Arc::clone(&registry), resize_debounce);
        let (events, stream) = event_channel();
        let mux = Self {
            registry,
            resizer,
            events,
            default_geometry: Geometry::default(),
        };
        (mux, stream)
    }

    /// Build from loaded configuration.
    pub fn from_config(config: &Config) -> std::result::Result<(Self, EventStream), ConfigError> {
        let (mut mux, stream) = Self::new(
            config.shell_command(),
            config.session_options(),
            config.resize_debounce(),
        );
        mux.default_geometry = config.default_geometry()?;
        Ok((mux, stream))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Geometry used when a session is opened without one.
    pub fn default_geometry(&self) -> Geometry {
        self.default_geometry
    }

    /// Open a session whose events go to the shared stream.
    pub fn open_session(&self, geometry: Geometry) -> Result<SessionId> {
        self.registry
            .open_session_with_sink(geometry, self.events.clone())
    }

    pub async fn input(&self, id: SessionId, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.registry.write(id, bytes).await
    }

    /// Request a resize; bursts for the same session collapse to the latest.
    ///
    /// Returns once the request is queued, before it is applied, so a later
    /// write may reach the shell while the old size is still in effect. Use
    /// [`resize_now`](Self::resize_now) when the new size must be in place first.
    pub fn resize(&self, id: SessionId, geometry: Geometry) -> Result<()> {
        self.resizer.request(id, geometry)
    }

    /// Resize immediately, bypassing coalescing.
    pub async fn resize_now(&self, id: SessionId, geometry: Geometry) -> Result<()> {
        self.registry.resize(id, geometry).await
    }

    pub async fn close_session(&self, id: SessionId) -> Result<()> {
        self.resizer.forget(id);
        self.registry.close_session(id).await
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionId>> {
        self.registry.list_sessions()
    }

    /// Serve one request from the display surface.
    pub async fn handle(&self, request: Request) -> Response {
        debug!(?request, "handling request");
        match request {
            Request::OpenSession { geometry } => {
                match self.open_session(geometry.unwrap_or(self.default_geometry)) {
                    Ok(session_id) => Response::Opened { session_id },
                    Err(e) => e.into(),
                }
            }
            Request::Input { session_id, data } => self.input(session_id, data).await.into(),
            Request::Resize {
                session_id,
                geometry,
            } => self.resize(session_id, geometry).into(),
            Request::CloseSession { session_id } => self.close_session(session_id).await.into(),
            Request::ListSessions => match self.list_sessions() {
                Ok(session_ids) => Response::Sessions { session_ids },
                Err(e) => e.into(),
            },
        }
    }

    /// Close every session.
    pub async fn shutdown(&self) -> Result<()> {
        for id in self.registry.list_sessions()? {
            self.resizer.forget(id);
        }
        let closed = self.registry.close_all().await?;
        info!(closed, "multiplexer shut down");
        Ok(())
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("registry", &self.registry)
            .field("default_geometry", &self.default_geometry)
            .finish_non_exhaustive()
    }
}
