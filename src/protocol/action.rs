//! Typed browser actions.
//!
//! Actions are the request types the browser agent understands. Payloads are
//! opaque to the correlation layer; this enum only gives the orchestrator a
//! typed way to build them.
//!
//! # Action Types
//!
//! | Group | Types |
//! |-------|-------|
//! | Navigation | `browser_navigate`, `browser_go_back`, `browser_go_forward`, `browser_wait` |
//! | Input | `browser_click`, `browser_type`, `browser_hover`, `browser_select_option`, `browser_press_key` |
//! | Capture | `capture_screenshot`, `capture_snapshot`, `get_console_logs` |
//! | Page | `browser_execute_js`, `browser_get_inner_html` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Action
// ============================================================================

/// A request the agent can execute.
///
/// Serializes with the wire type in `type` and the payload in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Action {
    /// Navigate to URL.
    #[serde(rename = "browser_navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },

    /// Navigate back in history.
    #[serde(rename = "browser_go_back")]
    GoBack,

    /// Navigate forward in history.
    #[serde(rename = "browser_go_forward")]
    GoForward,

    /// Wait for a number of seconds.
    #[serde(rename = "browser_wait")]
    Wait {
        /// Seconds to wait.
        time: f64,
    },

    /// Click an element.
    #[serde(rename = "browser_click")]
    Click {
        /// Human-readable element description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element: Option<String>,
        /// Element reference from a snapshot.
        #[serde(rename = "ref")]
        reference: String,
    },

    /// Type text into an editable element.
    #[serde(rename = "browser_type")]
    Type {
        /// Human-readable element description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element: Option<String>,
        /// Element reference from a snapshot.
        #[serde(rename = "ref")]
        reference: String,
        /// Text to type.
        text: String,
        /// Press Enter afterwards.
        #[serde(default)]
        submit: bool,
    },

    /// Hover over an element.
    #[serde(rename = "browser_hover")]
    Hover {
        /// Human-readable element description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element: Option<String>,
        /// Element reference from a snapshot.
        #[serde(rename = "ref")]
        reference: String,
    },

    /// Select options in a dropdown.
    #[serde(rename = "browser_select_option")]
    SelectOption {
        /// Human-readable element description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element: Option<String>,
        /// Element reference from a snapshot.
        #[serde(rename = "ref")]
        reference: String,
        /// Option values to select.
        values: Vec<String>,
    },

    /// Press a keyboard key.
    #[serde(rename = "browser_press_key")]
    PressKey {
        /// Key name (e.g. `Enter`, `ArrowLeft`).
        key: String,
    },

    /// Capture a screenshot of the visible tab.
    #[serde(rename = "capture_screenshot")]
    Screenshot,

    /// Capture an accessibility snapshot.
    #[serde(rename = "capture_snapshot")]
    Snapshot,

    /// Return collected console logs.
    #[serde(rename = "get_console_logs")]
    ConsoleLogs,

    /// Execute JavaScript in the page.
    #[serde(rename = "browser_execute_js")]
    ExecuteJs {
        /// Script source.
        script: String,
    },

    /// Get inner HTML or text of elements matching a selector.
    #[serde(rename = "browser_get_inner_html")]
    GetInnerHtml {
        /// CSS selector.
        selector: String,
        /// Return every match instead of the first.
        #[serde(rename = "getAll", default)]
        get_all: bool,
        /// Return `textContent` instead of `innerHTML`.
        #[serde(rename = "getTextContent", default)]
        get_text_content: bool,
    },
}

impl Action {
    /// Returns the wire type of this action.
    #[must_use]
    pub const fn wire_type(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "browser_navigate",
            Self::GoBack => "browser_go_back",
            Self::GoForward => "browser_go_forward",
            Self::Wait { .. } => "browser_wait",
            Self::Click { .. } => "browser_click",
            Self::Type { .. } => "browser_type",
            Self::Hover { .. } => "browser_hover",
            Self::SelectOption { .. } => "browser_select_option",
            Self::PressKey { .. } => "browser_press_key",
            Self::Screenshot => "capture_screenshot",
            Self::Snapshot => "capture_snapshot",
            Self::ConsoleLogs => "get_console_logs",
            Self::ExecuteJs { .. } => "browser_execute_js",
            Self::GetInnerHtml { .. } => "browser_get_inner_html",
        }
    }

    /// Returns the payload sent in the frame's `data` field.
    ///
    /// Unit actions send an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn payload(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        let data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(data)
    }

    /// Parses an action from a frame's type and data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown types or malformed payloads.
    pub fn parse(action_type: &str, data: Value) -> Result<Self> {
        let data = match data {
            Value::Object(map) if map.is_empty() => Value::Null,
            other => other,
        };

        let mut envelope = serde_json::Map::new();
        envelope.insert("type".into(), Value::String(action_type.to_string()));
        if !data.is_null() {
            envelope.insert("data".into(), data);
        }

        serde_json::from_value(Value::Object(envelope))
            .map_err(|e| Error::protocol(format!("Invalid {action_type} request: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_navigate_payload() {
        let action = Action::Navigate {
            url: "https://example.com".into(),
        };

        assert_eq!(action.wire_type(), "browser_navigate");
        assert_eq!(
            action.payload().expect("payload"),
            json!({ "url": "https://example.com" })
        );
    }

    #[test]
    fn test_unit_action_payload_is_empty_object() {
        assert_eq!(Action::GoBack.payload().expect("payload"), json!({}));
        assert_eq!(Action::Screenshot.wire_type(), "capture_screenshot");
    }

    #[test]
    fn test_click_renames_reference() {
        let action = Action::Click {
            element: None,
            reference: "x".into(),
        };

        assert_eq!(action.payload().expect("payload"), json!({ "ref": "x" }));
    }

    #[test]
    fn test_wire_type_matches_serde_tag() {
        let actions = [
            Action::Wait { time: 1.5 },
            Action::PressKey { key: "Enter".into() },
            Action::ConsoleLogs,
            Action::GetInnerHtml {
                selector: "h1".into(),
                get_all: true,
                get_text_content: false,
            },
        ];

        for action in actions {
            let value = serde_json::to_value(&action).expect("serialize");
            assert_eq!(value["type"], action.wire_type());
        }
    }

    #[test]
    fn test_parse_type_request() {
        let action = Action::parse(
            "browser_type",
            json!({ "ref": "y", "text": "hi", "submit": false }),
        )
        .expect("parse");

        assert_eq!(
            action,
            Action::Type {
                element: None,
                reference: "y".into(),
                text: "hi".into(),
                submit: false,
            }
        );
    }

    #[test]
    fn test_parse_unit_action_with_empty_payload() {
        assert_eq!(
            Action::parse("browser_go_forward", json!({})).expect("parse"),
            Action::GoForward
        );
        assert_eq!(
            Action::parse("capture_snapshot", Value::Null).expect("parse"),
            Action::Snapshot
        );
    }

    #[test]
    fn test_parse_unknown_type() {
        let err = Action::parse("browser_fly", json!({})).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("browser_fly"));
    }
}
