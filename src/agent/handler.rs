//! Action handler seam.
//!
//! The agent core knows nothing about pages or DOM. Whatever actually
//! performs an action implements [`ActionHandler`]; the client serializes
//! calls to it and turns its result into a wire reply.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Executes one request received from the server.
///
/// Calls never overlap on one connection. The result is sent back as
/// `<base>_complete` with the returned data; an error is sent back as an
/// `error` frame carrying `err.to_string()`, so use
/// [`Error::remote`](crate::Error::remote) for a verbatim message.
///
/// # Example
///
/// ```ignore
/// use browser_bridge::{Action, ActionHandler, Error, Result};
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl ActionHandler for Echo {
///     async fn handle(&self, action_type: &str, data: Value) -> Result<Value> {
///         match Action::parse(action_type, data)? {
///             Action::Navigate { url } => Ok(json!({ "url": url })),
///             _ => Err(Error::remote(format!("Unsupported: {action_type}"))),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// Handles a request of `action_type` with its payload.
    async fn handle(&self, action_type: &str, data: Value) -> Result<Value>;
}
