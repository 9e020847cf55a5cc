//! PTY (Pseudo-Terminal) abstraction layer.
//!
//! This module wraps `portable-pty` behind a small owned handle: one PTY pair
//! plus the shell attached to its slave side. It supports both Unix PTY and
//! Windows ConPTY.

mod async_adapter;
mod native;

pub(crate) use async_adapter::join_reader;
pub use async_adapter::{ReadOutcome, SessionReader};
pub use native::{default_shell, PtyHandle, PtyReader, ReadChunk, ShellCommand, DEFAULT_TERM};

use serde::{Deserialize, Serialize};

use crate::error::MuxError;
use crate::Result;

/// Size of a terminal in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    /// Number of rows (height).
    pub rows: u16,
    /// Number of columns (width).
    pub cols: u16,
}

impl Geometry {
    /// Create a validated geometry.
    pub fn new(rows: u16, cols: u16) -> Result<Self> {
        let geometry = Self { rows, cols };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Reject geometries with a zero dimension.
    pub fn validate(&self) -> Result<()> {
        if self.rows < 1 || self.cols < 1 {
            return Err(MuxError::InvalidGeometry {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    pub(crate) fn to_native(self) -> portable_pty::PtySize {
        portable_pty::PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}
