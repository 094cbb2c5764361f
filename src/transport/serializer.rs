//! One-at-a-time action dispatch.
//!
//! The agent cannot safely run two page-mutating actions at once, and the
//! socket gives no ordering guarantee between independent requests.
//! [`ActionSerializer`] queues callers in FIFO order and hands the correlator
//! one request at a time. Request N+1 is not written to the socket until
//! request N has an outcome (success, remote error, or timeout).
//!
//! # Queue Lifecycle
//!
//! | Event | Effect |
//! |-------|--------|
//! | `enqueue` | Append; start the worker if idle |
//! | worker pop | Entry leaves the queue, its sender moves to the worker |
//! | outcome | Deliver, pop the next entry |
//! | `close` | Fail the in-flight request and every queued entry |

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::RequestCorrelator;

// ============================================================================
// Types
// ============================================================================

/// A caller waiting for its turn.
struct QueueEntry {
    action_type: String,
    payload: Value,
    enqueued_at: Instant,
    response_tx: oneshot::Sender<Result<Value>>,
}

/// Queue state, guarded as a unit.
#[derive(Default)]
struct ActionQueue {
    entries: VecDeque<QueueEntry>,
    in_flight: bool,
    closed: bool,
}

/// State shared with the worker task.
struct SerializerInner {
    correlator: Arc<RequestCorrelator>,
    queue: Mutex<ActionQueue>,
}

// ============================================================================
// ActionSerializer
// ============================================================================

/// FIFO queue in front of a [`RequestCorrelator`].
///
/// Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct ActionSerializer {
    inner: Arc<SerializerInner>,
}

impl ActionSerializer {
    /// Creates a serializer feeding `correlator`.
    #[must_use]
    pub fn new(correlator: Arc<RequestCorrelator>) -> Self {
        Self {
            inner: Arc::new(SerializerInner {
                correlator,
                queue: Mutex::new(ActionQueue::default()),
            }),
        }
    }

    /// Queues a request and returns a future for its outcome.
    ///
    /// The entry is appended before this returns, so queue order is call
    /// order even if the returned futures are polled out of order. Must be
    /// called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// The future resolves to whatever the correlator produced, or to
    /// [`Error::ConnectionClosed`] if the serializer closed first.
    pub fn enqueue(
        &self,
        action_type: impl Into<String>,
        payload: Value,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        let action_type = action_type.into();
        let (response_tx, response_rx) = oneshot::channel();

        let start_worker = {
            let mut queue = self.inner.queue.lock();
            if queue.closed {
                let _ = response_tx.send(Err(Error::ConnectionClosed));
                false
            } else {
                trace!(action_type = %action_type, queued = queue.entries.len(), "Action queued");
                queue.entries.push_back(QueueEntry {
                    action_type,
                    payload,
                    enqueued_at: Instant::now(),
                    response_tx,
                });
                !std::mem::replace(&mut queue.in_flight, true)
            }
        };

        if start_worker {
            tokio::spawn(Self::run_worker(Arc::clone(&self.inner)));
        }

        async move { response_rx.await.unwrap_or(Err(Error::ConnectionClosed)) }
    }

    /// Closes the serializer.
    ///
    /// Closes the correlator, which fails the in-flight request, then
    /// rejects every queued entry with [`Error::ConnectionClosed`]. Later
    /// enqueues fail immediately.
    pub fn close(&self) {
        self.inner.correlator.close();

        let drained: Vec<_> = {
            let mut queue = self.inner.queue.lock();
            queue.closed = true;
            queue.in_flight = false;
            queue.entries.drain(..).collect()
        };

        let count = drained.len();
        for entry in drained {
            let _ = entry.response_tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Rejected queued actions on close");
        }
    }

    /// Returns the number of callers still waiting for their turn.
    #[inline]
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.queue.lock().entries.len()
    }

    /// Returns `true` while a request is being processed.
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.inner.queue.lock().in_flight
    }

    /// Returns `true` once closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.queue.lock().closed
    }

    /// Returns the correlator this serializer feeds.
    #[inline]
    #[must_use]
    pub fn correlator(&self) -> &Arc<RequestCorrelator> {
        &self.inner.correlator
    }

    /// Processes entries until the queue is empty or closed.
    async fn run_worker(inner: Arc<SerializerInner>) {
        loop {
            let entry = {
                let mut queue = inner.queue.lock();
                if queue.closed {
                    return;
                }
                match queue.entries.pop_front() {
                    Some(entry) => entry,
                    None => {
                        queue.in_flight = false;
                        return;
                    }
                }
            };

            if entry.response_tx.is_closed() {
                trace!(action_type = %entry.action_type, "Skipping abandoned action");
                continue;
            }

            trace!(
                action_type = %entry.action_type,
                waited_ms = entry.enqueued_at.elapsed().as_millis() as u64,
                "Dispatching action"
            );

            let outcome = inner
                .correlator
                .send(&entry.action_type, entry.payload)
                .await;
            let _ = entry.response_tx.send(outcome);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
