//! Session events and end-of-life causes.

use serde::{Deserialize, Serialize};

use super::SessionId;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndCause {
    /// The child exited and the output stream reached its end.
    ///
    /// `code` is `None` if the child could not be reaped in time.
    Exited { code: Option<u32>, success: bool },
    /// Reading the PTY failed.
    Failed { error: String },
    /// The session was closed on request.
    Closed,
}

impl EndCause {
    pub(crate) fn from_exit(status: Option<portable_pty::ExitStatus>) -> Self {
        match status {
            Some(status) => Self::Exited {
                code: Some(status.exit_code()),
                success: status.success(),
            },
            None => Self::Exited {
                code: None,
                success: false,
            },
        }
    }

    /// A clean shell exit or an explicit close.
    ///
    /// Signals, non-zero exit codes and read failures are not normal.
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            Self::Exited { success: true, .. } | Self::Closed
        )
    }

    /// The session ended because the child process went away on its own.
    pub fn is_process_exit(&self) -> bool {
        matches!(self, Self::Exited { .. })
    }
}

/// A piece of session output, exactly as read from the PTY.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub session_id: SessionId,
    pub bytes: Vec<u8>,
}

/// What a session sink receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Output bytes, in read order per session.
    Output(OutputChunk),
    /// Final notification; nothing follows it for this session.
    SessionEnded {
        session_id: SessionId,
        cause: EndCause,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Output(chunk) => chunk.session_id,
            Self::SessionEnded { session_id, .. } => *session_id,
        }
    }

    pub(crate) fn output_len(&self) -> usize {
        match self {
            Self::Output(chunk) => chunk.bytes.len(),
            Self::SessionEnded { .. } => 0,
        }
    }
}
