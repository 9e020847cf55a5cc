//! Session management module.
//!
//! A session pairs one PTY with the shell running in it, the task draining
//! its output, and the queue that applies writes and resizes in order. The
//! [`SessionRegistry`] owns every live session by [`SessionId`].

mod handle;
mod id;
mod output;
mod registry;
mod state;
mod worker;

pub use handle::{Session, SessionOptions};
pub use id::{ParseSessionIdError, SessionId};
pub use output::{event_channel, EventStream, OutputSink};
pub use registry::SessionRegistry;
pub use state::{EndCause, OutputChunk, SessionEvent};
