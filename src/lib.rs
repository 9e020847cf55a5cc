//! # ptymux
//!
//! Multiplexed PTY session manager for tabbed terminal front-ends.
//!
//! Each session is one shell running in its own pseudo-terminal. The crate
//! opens and closes sessions, forwards input, coalesces resize requests, and
//! streams every session's output back in order. It supports both Windows
//! (ConPTY) and Unix (PTY) terminals through a unified interface. Rendering
//! and terminal emulation are left to the display surface.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ptymux::{Geometry, Multiplexer, SessionEvent, SessionOptions, ShellCommand};
//!
//! #[tokio::main]
//! async fn main() -> ptymux::Result<()> {
//!     ptymux::logging::try_init().ok();
//!
//!     let (mux, mut events) = Multiplexer::new(
//!         ShellCommand::default(),
//!         SessionOptions::default(),
//!         ptymux::resize::DEFAULT_DEBOUNCE,
//!     );
//!
//!     let id = mux.open_session(Geometry::default())?;
//!     mux.input(id, "echo hello\n").await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let SessionEvent::Output(chunk) = event {
//!             print!("{}", String::from_utf8_lossy(&chunk.bytes));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod mux;
pub mod pty;
pub mod resize;
pub mod session;

// Re-export commonly used types
pub use error::{MuxError, Result};
pub use message::{Request, Response};
pub use mux::Multiplexer;
pub use pty::{Geometry, ShellCommand};
pub use resize::{ResizeCoordinator, ResizeTarget};
pub use session::{
    EndCause, EventStream, OutputChunk, OutputSink, Session, SessionEvent, SessionId,
    SessionOptions, SessionRegistry,
};
