//! Requests and responses exchanged with a display surface.
//!
//! Messages are internally tagged JSON objects:
//!
//! ```json
//! {"type": "resize", "session_id": "sess-00000001", "geometry": {"rows": 40, "cols": 120}}
//! ```
//!
//! Session output travels separately as [`SessionEvent`](crate::session::SessionEvent)s.

use serde::{Deserialize, Serialize};

use crate::error::MuxError;
use crate::pty::Geometry;
use crate::session::SessionId;

/// A command from the display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Start a new shell. Without a geometry the configured default is used.
    OpenSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        geometry: Option<Geometry>,
    },
    /// Keystrokes or pasted text for a session.
    ///
    /// `data` is sent as a byte array and also accepted as a JSON string.
    Input {
        session_id: SessionId,
        #[serde(deserialize_with = "text_or_bytes")]
        data: Vec<u8>,
    },
    /// The surface showing a session changed size. Coalesced.
    Resize {
        session_id: SessionId,
        geometry: Geometry,
    },
    CloseSession {
        session_id: SessionId,
    },
    ListSessions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputData {
    Text(String),
    Bytes(Vec<u8>),
}

/// Terminal input is opaque bytes (8-bit meta keys are not UTF-8), but most
/// front-ends send text.
fn text_or_bytes<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    Ok(match InputData::deserialize(deserializer)? {
        InputData::Text(text) => text.into_bytes(),
        InputData::Bytes(bytes) => bytes,
    })
}

/// The answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Opened { session_id: SessionId },
    Ok,
    Sessions { session_ids: Vec<SessionId> },
    Error { code: String, message: String },
}

impl Response {
    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<MuxError> for Response {
    fn from(err: MuxError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<crate::Result<()>> for Response {
    fn from(result: crate::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_json() {
        let request: Request = serde_json::from_value(json!({
            "type": "input",
            "session_id": "sess-0000000a",
            "data": "ls -la\r"
        }))
        .unwrap();

        assert_eq!(
            request,
            Request::Input {
                session_id: SessionId::from_raw(10),
                data: b"ls -la\r".to_vec(),
            }
        );
    }

    #[test]
    fn test_input_accepts_raw_bytes() {
        // ESC, then an 8-bit meta "a" that is not valid UTF-8.
        let request: Request = serde_json::from_value(json!({
            "type": "input",
            "session_id": "sess-0000000a",
            "data": [27, 225]
        }))
        .unwrap();

        assert_eq!(
            request,
            Request::Input {
                session_id: SessionId::from_raw(10),
                data: vec![0x1b, 0xe1],
            }
        );

        let back: Request = serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_open_session_geometry_optional() {
        let request: Request = serde_json::from_str(r#"{"type": "open_session"}"#).unwrap();
        assert_eq!(request, Request::OpenSession { geometry: None });

        let request: Request = serde_json::from_str(
            r#"{"type": "open_session", "geometry": {"rows": 30, "cols": 100}}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::OpenSession {
                geometry: Some(Geometry { rows: 30, cols: 100 })
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<Request, _> = serde_json::from_str(r#"{"type": "reboot"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response = Response::from(MuxError::NotFound(SessionId::from_raw(3)));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "SESSION_NOT_FOUND");
        assert!(value["message"]
            .as_str()
            .unwrap()
            .contains("sess-00000003"));
        assert!(response.is_error());
    }

    #[test]
    fn test_sessions_response_shape() {
        let response = Response::Sessions {
            session_ids: vec![SessionId::from_raw(1), SessionId::from_raw(2)],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"type": "sessions", "session_ids": ["sess-00000001", "sess-00000002"]})
        );
        assert_eq!(serde_json::to_value(Response::Ok).unwrap(), json!({"type": "ok"}));
    }
}
