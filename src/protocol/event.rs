//! Unsolicited agent frames.
//!
//! Frames the correlator does not consume (no pending request matched) are
//! either requests from the peer or notifications. On the server side they
//! are parsed into [`AgentEvent`] for logging and subscribers.
//!
//! # Event Types
//!
//! | Frame type | Event |
//! |------------|-------|
//! | `connection` | [`AgentEvent::Hello`] |
//! | `navigation_changed` | [`AgentEvent::NavigationChanged`] |
//! | `error` | [`AgentEvent::Failure`] |
//! | `<base>_complete` | [`AgentEvent::LateCompletion`] |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use super::frame::{Frame, FrameKind};

// ============================================================================
// Constants
// ============================================================================

/// Notification type sent when the page URL changes.
const NAVIGATION_CHANGED_TYPE: &str = "navigation_changed";

// ============================================================================
// AgentEvent
// ============================================================================

/// Parsed unsolicited frame from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Agent said hello after connecting.
    Hello {
        /// Page URL, when the agent runs inside a page.
        url: Option<String>,
        /// Page title.
        title: Option<String>,
        /// Agent user agent or name.
        user_agent: Option<String>,
        /// Raw hello payload.
        data: Value,
    },

    /// Page navigated.
    NavigationChanged {
        /// New page URL.
        url: String,
        /// New page title.
        title: String,
    },

    /// Agent reported an error not tied to a pending request.
    Failure {
        /// Error message.
        message: String,
    },

    /// Completion for a request that is no longer pending.
    ///
    /// Usually the request already timed out.
    LateCompletion {
        /// Base type of the completed request.
        base_type: String,
        /// Echoed request ID.
        id: String,
    },

    /// Anything else.
    Unknown {
        /// Frame type.
        frame_type: String,
        /// Frame payload.
        data: Value,
    },
}

impl AgentEvent {
    /// Parses an unsolicited frame.
    ///
    /// Returns `None` for heartbeat traffic.
    #[must_use]
    pub fn from_frame(frame: Frame) -> Option<Self> {
        let event = match frame.kind() {
            FrameKind::Heartbeat | FrameKind::HeartbeatAck => return None,

            FrameKind::Hello => Self::Hello {
                url: get_optional_string(&frame.data, "url"),
                title: get_optional_string(&frame.data, "title"),
                user_agent: get_optional_string(&frame.data, "userAgent"),
                data: frame.data,
            },

            FrameKind::Failure => Self::Failure {
                message: frame
                    .error
                    .or_else(|| get_optional_string(&frame.data, "message"))
                    .unwrap_or_else(|| frame.data.to_string()),
            },

            FrameKind::Completion => Self::LateCompletion {
                base_type: frame.completed_type().unwrap_or_default().to_string(),
                id: frame.id,
            },

            FrameKind::Request if frame.frame_type == NAVIGATION_CHANGED_TYPE => {
                Self::NavigationChanged {
                    url: get_string(&frame.data, "url"),
                    title: get_string(&frame.data, "title"),
                }
            }

            FrameKind::Request => Self::Unknown {
                frame_type: frame.frame_type,
                data: frame.data,
            },
        };

        Some(event)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Gets a string from a payload.
#[inline]
fn get_string(data: &Value, key: &str) -> String {
    get_optional_string(data, key).unwrap_or_default()
}

/// Gets an optional string from a payload.
#[inline]
fn get_optional_string(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<AgentEvent> {
        AgentEvent::from_frame(Frame::from_json(json).expect("parse frame"))
    }

    #[test]
    fn test_hello_parsing() {
        let event = parse(
            r#"{"type":"connection","data":{"url":"https://example.com","title":"Example","userAgent":"Mozilla/5.0"}}"#,
        );

        match event {
            Some(AgentEvent::Hello {
                url,
                title,
                user_agent,
                ..
            }) => {
                assert_eq!(url.as_deref(), Some("https://example.com"));
                assert_eq!(title.as_deref(), Some("Example"));
                assert_eq!(user_agent.as_deref(), Some("Mozilla/5.0"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_navigation_changed() {
        let event = parse(r#"{"type":"navigation_changed","data":{"url":"https://b.test","title":"B"}}"#);
        assert_eq!(
            event,
            Some(AgentEvent::NavigationChanged {
                url: "https://b.test".into(),
                title: "B".into(),
            })
        );
    }

    #[test]
    fn test_failure_from_data_message() {
        let event = parse(r#"{"type":"error","data":{"message":"content script crashed"}}"#);
        assert_eq!(
            event,
            Some(AgentEvent::Failure {
                message: "content script crashed".into(),
            })
        );
    }

    #[test]
    fn test_late_completion() {
        let event = parse(r#"{"id":"abc","type":"click_complete","data":{}}"#);
        assert_eq!(
            event,
            Some(AgentEvent::LateCompletion {
                base_type: "click".into(),
                id: "abc".into(),
            })
        );
    }

    #[test]
    fn test_heartbeat_is_not_an_event() {
        assert_eq!(parse(r#"{"id":"abc","type":"heartbeat_ack"}"#), None);
        assert_eq!(parse(r#"{"id":"abc","type":"heartbeat"}"#), None);
    }

    #[test]
    fn test_unknown_event() {
        match parse(r#"{"type":"custom.thing","data":{"foo":"bar"}}"#) {
            Some(AgentEvent::Unknown { frame_type, data }) => {
                assert_eq!(frame_type, "custom.thing");
                assert_eq!(data["foo"], "bar");
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}
