//! Single active connection.
//!
//! The agent serves one session at a time. [`ConnectionRegistry`] holds that
//! session's [`Connection`]; installing a new one evicts the previous one
//! under the same write lock, so no caller can observe both as active.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::Action;

use super::Connection;

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Holds the one active connection.
///
/// Shared by `Arc` between the accept (or reconnect) loop and callers.
pub struct ConnectionRegistry {
    /// Active connection, if any.
    active: RwLock<Option<Connection>>,
    /// ID of the active connection, for waiters.
    changes: watch::Sender<Option<ConnectionId>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            active: RwLock::new(None),
            changes,
        }
    }

    /// Installs `connection` as the active one.
    ///
    /// The previous connection, if any, is closed before the new one is
    /// visible. Its queued and in-flight requests fail with
    /// [`Error::ConnectionClosed`].
    pub fn set_active(&self, connection: Connection) {
        let id = connection.id();
        let mut active = self.active.write();

        if let Some(previous) = active.take() {
            info!(previous = %previous.id(), next = %id, "Evicting previous connection");
            previous.close();
        }

        *active = Some(connection);
        self.changes.send_replace(Some(id));
        debug!(connection = %id, "Connection active");
    }

    /// Returns the active connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if none is installed.
    pub fn get_active(&self) -> Result<Connection> {
        self.active.read().clone().ok_or(Error::NotConnected)
    }

    /// Closes and removes the active connection. No-op if none.
    pub fn close(&self) {
        let previous = self.active.write().take();

        if let Some(connection) = previous {
            info!(connection = %connection.id(), "Closing active connection");
            connection.close();
            self.changes.send_replace(None);
        }
    }

    /// Queues a request on the active connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if none is installed, otherwise
    /// whatever the request produced.
    pub async fn enqueue(&self, action_type: &str, payload: Value) -> Result<Value> {
        let connection = self.get_active()?;
        connection.enqueue(action_type, payload).await
    }

    /// Queues a typed action on the active connection.
    ///
    /// # Errors
    ///
    /// Same as [`enqueue`](Self::enqueue).
    pub async fn execute(&self, action: &Action) -> Result<Value> {
        let connection = self.get_active()?;
        connection.execute(action).await
    }

    /// Returns `true` if an open connection is installed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active
            .read()
            .as_ref()
            .is_some_and(Connection::is_open)
    }

    /// Returns the active connection's ID.
    #[must_use]
    pub fn active_id(&self) -> Option<ConnectionId> {
        self.active.read().as_ref().map(Connection::id)
    }

    /// Waits until an open connection is installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if none arrives within `wait`.
    pub async fn wait_for_active(&self, wait: Duration) -> Result<Connection> {
        let mut changes = self.changes.subscribe();

        let waiting = async {
            loop {
                if let Ok(connection) = self.get_active()
                    && connection.is_open()
                {
                    return connection;
                }

                // The sender lives in `self`, so this cannot fail while borrowed.
                let _ = changes.changed().await;
            }
        };

        timeout(wait, waiting)
            .await
            .map_err(|_| Error::connection_timeout(wait.as_millis() as u64))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use serde_json::json;

    use crate::transport::ConnectionState;
    use crate::protocol::Frame;
    use crate::transport::testing::{RecordingTransport, SentFrames};

    fn connection() -> (Connection, Arc<RecordingTransport>, SentFrames) {
        let (transport, sent) = RecordingTransport::new();
        let connection = Connection::new(transport.clone(), Duration::from_secs(30), None);
        (connection, transport, sent)
    }

    #[tokio::test]
    async fn test_empty_registry_is_not_connected() {
        let registry = ConnectionRegistry::new();

        assert!(!registry.is_connected());
        assert!(matches!(registry.get_active(), Err(Error::NotConnected)));

        let err = registry.execute(&Action::GoBack).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(err.to_string().contains("Connect"));
    }

    #[tokio::test]
    async fn test_second_connection_evicts_first() {
        let registry = ConnectionRegistry::new();
        let (first, first_transport, mut first_sent) = connection();
        let (second, second_transport, mut second_sent) = connection();

        registry.set_active(first.clone());
        let stranded = tokio::spawn(first.enqueue("browser_click", json!({})));
        first_sent.next().await;

        registry.set_active(second.clone());

        assert!(first_transport.is_closed());
        assert_eq!(first.state(), ConnectionState::Closed);
        assert!(matches!(stranded.await.expect("join"), Err(Error::ConnectionClosed)));

        assert!(!second_transport.is_closed());
        assert_eq!(registry.active_id(), Some(second.id()));

        let task = tokio::spawn({
            let second = second.clone();
            async move { second.execute(&Action::Screenshot).await }
        });
        let request = second_sent.next().await;
        assert_eq!(request.frame_type, "capture_screenshot");
        let reply = Frame::completion(request.id, "capture_screenshot", json!("png"));
        second.handle_incoming(&reply.to_json().expect("serialize"));
        assert_eq!(task.await.expect("join").expect("screenshot"), json!("png"));
    }

    #[tokio::test]
    async fn test_close_rejects_and_clears() {
        let registry = ConnectionRegistry::new();
        let (conn, transport, mut sent) = connection();
        registry.set_active(conn.clone());

        let pending = tokio::spawn(conn.enqueue("browser_hover", json!({})));
        sent.next().await;

        registry.close();
        registry.close();

        assert!(transport.is_closed());
        assert_eq!(transport.close_calls(), 1);
        assert!(matches!(pending.await.expect("join"), Err(Error::ConnectionClosed)));
        assert!(matches!(registry.get_active(), Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_closed_connection_stays_installed() {
        let registry = ConnectionRegistry::new();
        let (conn, _transport, _sent) = connection();
        registry.set_active(conn.clone());

        conn.close();

        assert!(!registry.is_connected());
        let err = registry.enqueue("browser_click", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_active() {
        let registry = Arc::new(ConnectionRegistry::new());

        let err = registry.wait_for_active(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 1000 }));

        let waiter = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.wait_for_active(Duration::from_secs(10)).await }
        });
        tokio::task::yield_now().await;

        let (conn, _transport, _sent) = connection();
        registry.set_active(conn.clone());

        let found = waiter.await.expect("join").expect("active");
        assert_eq!(found.id(), conn.id());
    }
}
