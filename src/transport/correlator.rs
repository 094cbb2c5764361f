//! Request/response correlation.
//!
//! The socket has no notion of a reply. [`RequestCorrelator`] tags each
//! outbound request with a fresh [`RequestId`], keeps a pending entry keyed by
//! it, and resolves that entry when a frame echoing the ID comes back.
//!
//! # Pending Entry Lifecycle
//!
//! An entry is removed exactly once, by whichever happens first:
//!
//! - a matching response arrives ([`RequestCorrelator::handle_incoming`])
//! - the request times out
//! - the connection closes ([`RequestCorrelator::close`])
//! - the send fails or the caller drops the future
//!
//! The last three go through [`PendingGuard`], which removes the entry on
//! drop. A response that arrives after removal matches nothing and is
//! discarded.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Frame, FrameKind};

use super::Transport;

// ============================================================================
// Types
// ============================================================================

/// A request awaiting its response.
struct PendingRequest {
    /// Request type, for logs.
    request_type: String,
    /// When the request was registered.
    created_at: Instant,
    /// Delivers the outcome to the waiting caller.
    response_tx: oneshot::Sender<Result<Value>>,
}

/// Pending requests plus the closed flag, guarded together.
#[derive(Default)]
struct PendingTable {
    entries: FxHashMap<RequestId, PendingRequest>,
    closed: bool,
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a pending entry when dropped.
///
/// Held by [`RequestCorrelator::send`] for the whole wait, so every exit path
/// (timeout, send failure, cancellation) unregisters the request.
struct PendingGuard<'a> {
    table: &'a Mutex<PendingTable>,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.table.lock().entries.remove(&self.id) {
            trace!(
                id = %self.id.short(),
                request_type = %entry.request_type,
                "Pending request unregistered"
            );
        }
    }
}

// ============================================================================
// RequestCorrelator
// ============================================================================

/// Matches inbound frames to outbound requests by identifier.
pub struct RequestCorrelator {
    /// Outbound socket.
    transport: Arc<dyn Transport>,
    /// Pending requests by ID.
    pending: Mutex<PendingTable>,
    /// Time to wait for each response.
    request_timeout: Duration,
}

impl RequestCorrelator {
    /// Creates a correlator sending through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, request_timeout: Duration) -> Self {
        Self {
            transport,
            pending: Mutex::new(PendingTable::default()),
            request_timeout,
        }
    }

    /// Sends a request and waits for the matching response.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if the agent reported failure
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::ConnectionClosed`] if the connection closed first
    pub async fn send(&self, request_type: &str, payload: Value) -> Result<Value> {
        let id = RequestId::generate();
        let text = Frame::request(id, request_type, payload).to_json()?;

        let (response_tx, response_rx) = oneshot::channel();
        let _guard = self.register(id, request_type, response_tx)?;

        self.transport.send_text(text)?;
        debug!(id = %id.short(), request_type, "Request sent");

        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let timeout_ms = self.request_timeout.as_millis() as u64;
                warn!(id = %id.short(), request_type, timeout_ms, "Request timed out");
                Err(Error::request_timeout(request_type, id, timeout_ms))
            }
        }
    }

    /// Handles one inbound text frame.
    ///
    /// Resolves the matching pending request, if any. Malformed frames and
    /// heartbeat acknowledgments are consumed. Any other frame that matches
    /// nothing is returned so the connection can route it.
    pub fn handle_incoming(&self, text: &str) -> Option<Frame> {
        let frame = match Frame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Discarding malformed frame");
                return None;
            }
        };

        if frame.kind() == FrameKind::HeartbeatAck {
            trace!("Heartbeat acknowledged");
            return None;
        }

        let entry = RequestId::parse(&frame.id)
            .and_then(|id| self.pending.lock().entries.remove(&id));

        let Some(entry) = entry else {
            trace!(id = %frame.id, frame_type = %frame.frame_type, "No pending request for frame");
            return Some(frame);
        };

        debug!(
            id = %frame.id,
            request_type = %entry.request_type,
            frame_type = %frame.frame_type,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "Response received"
        );

        let _ = entry.response_tx.send(frame.into_outcome());
        None
    }

    /// Fails every pending request with [`Error::ConnectionClosed`].
    ///
    /// Later sends fail immediately without touching the transport.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut table = self.pending.lock();
            table.closed = true;
            table.entries.drain().collect()
        };

        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.response_tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on close");
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().entries.len()
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }

    /// Returns the per-request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Registers a pending entry, refusing once closed.
    fn register(
        &self,
        id: RequestId,
        request_type: &str,
        response_tx: oneshot::Sender<Result<Value>>,
    ) -> Result<PendingGuard<'_>> {
        let mut table = self.pending.lock();
        if table.closed {
            return Err(Error::ConnectionClosed);
        }

        table.entries.insert(
            id,
            PendingRequest {
                request_type: request_type.to_string(),
                created_at: Instant::now(),
                response_tx,
            },
        );

        Ok(PendingGuard {
            table: &self.pending,
            id,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::testing::{RecordingTransport, SentFrames};

    fn correlator(
        request_timeout: Duration,
    ) -> (Arc<RequestCorrelator>, Arc<RecordingTransport>, SentFrames) {
        let (transport, sent) = RecordingTransport::new();
        let correlator = Arc::new(RequestCorrelator::new(transport.clone(), request_timeout));
        (correlator, transport, sent)
    }

    fn reply(frame: &Frame, data: Value) -> String {
        Frame::completion(frame.id.clone(), &frame.frame_type, data)
            .to_json()
            .expect("serialize")
    }

    #[tokio::test]
    async fn test_matching_response_resolves_request() {
        let (correlator, _transport, mut sent) = correlator(Duration::from_secs(30));

        let task = tokio::spawn({
            let correlator = Arc::clone(&correlator);
            async move { correlator.send("browser_click", json!({ "ref": "x" })).await }
        });

        let request = sent.next().await;
        assert_eq!(request.frame_type, "browser_click");
        assert_eq!(request.data, json!({ "ref": "x" }));
        assert_eq!(correlator.pending_count(), 1);

        assert!(correlator.handle_incoming(&reply(&request, json!({ "ok": true }))).is_none());

        let data = task.await.expect("join").expect("response");
        assert_eq!(data, json!({ "ok": true }));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_non_matching_id_resolves_nothing() {
        let (correlator, _transport, mut sent) = correlator(Duration::from_secs(30));

        let task = tokio::spawn({
            let correlator = Arc::clone(&correlator);
            async move { correlator.send("browser_hover", json!({})).await }
        });
        let request = sent.next().await;

        let foreign = Frame::completion(RequestId::generate().to_string(), "browser_hover", json!(1));
        let returned = correlator.handle_incoming(&foreign.to_json().expect("serialize"));
        assert_eq!(returned, Some(foreign));
        assert_eq!(correlator.pending_count(), 1);
        assert!(!task.is_finished());

        correlator.handle_incoming(&reply(&request, json!(2)));
        assert_eq!(task.await.expect("join").expect("response"), json!(2));
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let (correlator, _transport, mut sent) = correlator(Duration::from_secs(30));

        let task = tokio::spawn({
            let correlator = Arc::clone(&correlator);
            async move { correlator.send("browser_click", json!({ "ref": "missing" })).await }
        });
        let request = sent.next().await;

        let failure = Frame::failure(request.id.clone(), "Element not found: missing");
        correlator.handle_incoming(&failure.to_json().expect("serialize"));

        let err = task.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::Remote { ref message } if message == "Element not found: missing"));
    }

    #[tokio::test]
    async fn test_malformed_and_heartbeat_frames_are_consumed() {
        let (correlator, _transport, mut sent) = correlator(Duration::from_secs(30));

        let task = tokio::spawn({
            let correlator = Arc::clone(&correlator);
            async move { correlator.send("capture_snapshot", json!({})).await }
        });
        let request = sent.next().await;

        assert!(correlator.handle_incoming("{ not json").is_none());
        let ack = Frame::heartbeat_ack(request.id.clone());
        assert!(correlator.handle_incoming(&ack.to_json().expect("serialize")).is_none());
        assert_eq!(correlator.pending_count(), 1);

        correlator.handle_incoming(&reply(&request, json!("tree")));
        assert_eq!(task.await.expect("join").expect("response"), json!("tree"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_discarded() {
        let (correlator, _transport, mut sent) = correlator(Duration::from_millis(30_000));

        let task = tokio::spawn({
            let correlator = Arc::clone(&correlator);
            async move { correlator.send("navigate", json!({ "url": "https://slow.test" })).await }
        });
        let request = sent.next().await;

        let err = task.await.expect("join").unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("navigate"));
        assert!(err.to_string().contains("30000ms"));
        assert_eq!(correlator.pending_count(), 0);

        let late = correlator.handle_incoming(&reply(&request, json!({})));
        assert!(late.is_some());
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_later_sends() {
        let (correlator, _transport, mut sent) = correlator(Duration::from_secs(30));

        let task = tokio::spawn({
            let correlator = Arc::clone(&correlator);
            async move { correlator.send("browser_type", json!({ "text": "hi" })).await }
        });
        sent.next().await;

        correlator.close();
        assert!(correlator.is_closed());
        assert!(matches!(task.await.expect("join"), Err(Error::ConnectionClosed)));

        let err = correlator.send("browser_go_back", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(sent.try_next().is_none());
    }

    #[tokio::test]
    async fn test_send_failure_unregisters() {
        let (correlator, transport, _sent) = correlator(Duration::from_secs(30));
        transport.close();

        let err = correlator.send("browser_click", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_caller_unregisters() {
        let (correlator, _transport, mut sent) = correlator(Duration::from_secs(30));

        let task = tokio::spawn({
            let correlator = Arc::clone(&correlator);
            async move { correlator.send("browser_wait", json!({ "time": 10 })).await }
        });
        sent.next().await;
        assert_eq!(correlator.pending_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(correlator.pending_count(), 0);
    }
}
