//! Wire frame exchanged in both directions.
//!
//! Every message on the socket is one JSON [`Frame`]. Requests carry a fresh
//! [`RequestId`]; responses echo it.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Reserved Types
// ============================================================================

/// Suffix marking a successful response to a request of the base type.
pub const COMPLETE_SUFFIX: &str = "_complete";

/// Failure response type.
pub const ERROR_TYPE: &str = "error";

/// Liveness probe sent by the server.
pub const HEARTBEAT_TYPE: &str = "heartbeat";

/// Agent's reply to a heartbeat. Ignored by the correlator.
pub const HEARTBEAT_ACK_TYPE: &str = "heartbeat_ack";

/// Hello frame the agent sends right after connecting.
pub const HELLO_TYPE: &str = "connection";

/// Prefix that completion types drop from the request type.
const REQUEST_PREFIX: &str = "browser_";

// ============================================================================
// Frame
// ============================================================================

/// One JSON message on the socket.
///
/// # Format
///
/// ```json
/// { "id": "uuid", "type": "browser_click", "data": { "ref": "x" } }
/// { "id": "uuid", "type": "click_complete", "data": { ... } }
/// { "id": "uuid", "type": "error", "data": null, "error": "message" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Correlation identifier. Empty for unsolicited agent frames.
    #[serde(default)]
    pub id: String,

    /// Frame type.
    #[serde(rename = "type")]
    pub frame_type: String,

    /// Payload.
    #[serde(default)]
    pub data: Value,

    /// Failure message, present only on error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    /// Creates a request frame.
    #[inline]
    #[must_use]
    pub fn request(id: RequestId, frame_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.to_string(),
            frame_type: frame_type.into(),
            data,
            error: None,
        }
    }

    /// Creates the success response for a request of `request_type`.
    #[must_use]
    pub fn completion(id: impl Into<String>, request_type: &str, data: Value) -> Self {
        Self {
            id: id.into(),
            frame_type: completion_type(request_type),
            data,
            error: None,
        }
    }

    /// Creates a failure response.
    #[must_use]
    pub fn failure(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frame_type: ERROR_TYPE.to_string(),
            data: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Creates a heartbeat probe.
    #[inline]
    #[must_use]
    pub fn heartbeat(id: RequestId) -> Self {
        Self::request(id, HEARTBEAT_TYPE, Value::Null)
    }

    /// Creates a heartbeat acknowledgment echoing the probe's ID.
    #[inline]
    #[must_use]
    pub fn heartbeat_ack(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frame_type: HEARTBEAT_ACK_TYPE.to_string(),
            data: Value::Null,
            error: None,
        }
    }

    /// Creates the agent hello frame.
    #[inline]
    #[must_use]
    pub fn hello(data: Value) -> Self {
        Self {
            id: String::new(),
            frame_type: HELLO_TYPE.to_string(),
            data,
            error: None,
        }
    }

    /// Parses a frame from text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a frame.
    #[inline]
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes the frame to text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    #[inline]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Classifies the frame by its reserved type.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self.frame_type.as_str() {
            HEARTBEAT_ACK_TYPE => FrameKind::HeartbeatAck,
            HEARTBEAT_TYPE => FrameKind::Heartbeat,
            ERROR_TYPE => FrameKind::Failure,
            HELLO_TYPE => FrameKind::Hello,
            t if t.ends_with(COMPLETE_SUFFIX) => FrameKind::Completion,
            _ => FrameKind::Request,
        }
    }

    /// Returns the base type of a completion frame.
    ///
    /// `navigate_complete` yields `navigate`.
    #[inline]
    #[must_use]
    pub fn completed_type(&self) -> Option<&str> {
        self.frame_type.strip_suffix(COMPLETE_SUFFIX)
    }

    /// Converts a matched response into the caller's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] when the frame carries `error` or has the
    /// `error` type.
    pub fn into_outcome(self) -> Result<Value> {
        if let Some(message) = self.error {
            return Err(Error::remote(message));
        }

        if self.frame_type == ERROR_TYPE {
            return Err(Error::remote(failure_message(&self.data)));
        }

        Ok(self.data)
    }
}

// ============================================================================
// FrameKind
// ============================================================================

/// Frame classification by reserved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `<base>_complete` success response.
    Completion,
    /// `error` failure response or report.
    Failure,
    /// Server liveness probe.
    Heartbeat,
    /// Agent liveness reply.
    HeartbeatAck,
    /// Agent hello.
    Hello,
    /// Any other type: a request or notification from the peer.
    Request,
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds the completion type for a request type.
#[must_use]
pub fn completion_type(request_type: &str) -> String {
    let base = request_type
        .strip_prefix(REQUEST_PREFIX)
        .unwrap_or(request_type);
    format!("{base}{COMPLETE_SUFFIX}")
}

/// Extracts a failure message from an `error` frame payload.
fn failure_message(data: &Value) -> String {
    match data {
        Value::String(message) => message.clone(),
        Value::Null => "unknown error".to_string(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| other.to_string(), str::to_string),
    }
}

// ============================================================================
// Tests
// ============================================================================
