//! Error types for ptymux.

use thiserror::Error;

use crate::session::SessionId;

/// Main error type for session manager operations.
#[derive(Error, Debug)]
pub enum MuxError {
    /// PTY allocation or child process launch failed.
    #[error("failed to spawn session: {0}")]
    Spawn(String),

    /// No live session with the given ID.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Geometry with a zero dimension was requested.
    #[error("invalid geometry {rows}x{cols}: rows and cols must be at least 1")]
    InvalidGeometry { rows: u16, cols: u16 },

    /// I/O error on the PTY.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session's operation queue has shut down.
    #[error("session terminated")]
    Terminated,

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl MuxError {
    /// Stable error code used on the message contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "SPAWN_FAILED",
            Self::NotFound(_) | Self::Terminated => "SESSION_NOT_FOUND",
            Self::InvalidGeometry { .. } => "INVALID_GEOMETRY",
            Self::Io(_) => "IO_ERROR",
            Self::LockPoisoned => "INTERNAL_ERROR",
        }
    }

    /// Whether the error means the addressed session does not exist (anymore).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Terminated)
    }
}

/// Convenience Result type for ptymux operations.
pub type Result<T> = std::result::Result<T, MuxError>;
