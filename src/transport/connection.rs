//! Connection and socket event loop.
//!
//! A [`Connection`] pairs one transport with its own [`RequestCorrelator`]
//! and [`ActionSerializer`]. Closing it fails everything queued or in flight
//! on that transport and nothing else.
//!
//! # Event Loop
//!
//! A WebSocket-backed connection spawns a tokio task that handles:
//!
//! - Incoming text frames (responses go to the correlator)
//! - Unmatched frames (routed to the inbound handler)
//! - Outgoing frames queued through [`WsTransport`]
//! - Close requests from either side
//!
//! # States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Connecting` | Socket accepted, event loop not yet running |
//! | `Open` | Requests flow |
//! | `Closing` | Eviction or shutdown started |
//! | `Closed` | Pending and queued requests have been failed |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::protocol::{Action, Frame};

use super::socket::SocketCommand;
use super::{ActionSerializer, RequestCorrelator, Transport, WsTransport};

// ============================================================================
// Types
// ============================================================================

/// Callback for frames that matched no pending request.
///
/// Runs on the event loop task, so it should hand work off rather than block.
pub type InboundHandler = Box<dyn Fn(Frame) + Send + Sync>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, event loop not yet running.
    Connecting,
    /// Ready for requests.
    Open,
    /// Close started.
    Closing,
    /// Fully closed.
    Closed,
}

// ============================================================================
// Connection
// ============================================================================

/// State shared by all clones and the event loop.
struct ConnectionInner {
    id: ConnectionId,
    transport: Arc<dyn Transport>,
    serializer: ActionSerializer,
    state: watch::Sender<ConnectionState>,
    closed: AtomicBool,
    inbound: Option<InboundHandler>,
}

/// One transport with its correlator and serializer.
///
/// Cheap to clone; clones share the same transport and queue.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates an open connection over an existing transport.
    ///
    /// The caller feeds inbound text through
    /// [`handle_incoming`](Self::handle_incoming).
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        request_timeout: Duration,
        inbound: Option<InboundHandler>,
    ) -> Self {
        Self::with_state(transport, request_timeout, inbound, ConnectionState::Open)
    }

    /// Creates a connection from a WebSocket stream.
    ///
    /// Spawns the event loop task internally. Works for both accepted
    /// (server) and dialed (agent) sockets.
    pub fn websocket<S>(
        ws_stream: WebSocketStream<S>,
        request_timeout: Duration,
        inbound: Option<InboundHandler>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (transport, command_rx) = WsTransport::channel();
        let connection = Self::with_state(
            Arc::new(transport),
            request_timeout,
            inbound,
            ConnectionState::Connecting,
        );

        tokio::spawn(run_socket_loop(
            ws_stream,
            command_rx,
            Arc::clone(&connection.inner),
        ));

        connection
    }

    fn with_state(
        transport: Arc<dyn Transport>,
        request_timeout: Duration,
        inbound: Option<InboundHandler>,
        initial: ConnectionState,
    ) -> Self {
        let correlator = Arc::new(RequestCorrelator::new(
            Arc::clone(&transport),
            request_timeout,
        ));
        let (state, _) = watch::channel(initial);

        Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::next(),
                transport,
                serializer: ActionSerializer::new(correlator),
                state,
                closed: AtomicBool::new(false),
                inbound,
            }),
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Queues a request; see [`ActionSerializer::enqueue`].
    pub fn enqueue(
        &self,
        action_type: impl Into<String>,
        payload: Value,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        self.inner.serializer.enqueue(action_type, payload)
    }

    /// Queues a typed action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the action cannot be
    /// serialized, otherwise whatever the request produced.
    pub async fn execute(&self, action: &Action) -> Result<Value> {
        let payload = action.payload()?;
        self.enqueue(action.wire_type(), payload).await
    }

    /// Sends a frame outside the request queue.
    ///
    /// Used for replies, heartbeats and the hello frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the socket is gone.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.inner.transport.send_text(frame.to_json()?)
    }

    /// Feeds one inbound text frame.
    ///
    /// Responses resolve pending requests; other frames go to the inbound
    /// handler.
    pub fn handle_incoming(&self, text: &str) {
        self.inner.route_incoming(text);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes the connection.
    ///
    /// Moves to `Closing`, closes the transport, then fails every queued and
    /// in-flight request. Idempotent.
    pub fn close(&self) {
        self.inner.state.send_if_modified(|state| match state {
            ConnectionState::Closing | ConnectionState::Closed => false,
            _ => {
                *state = ConnectionState::Closing;
                true
            }
        });

        self.inner.transport.close();
        self.inner.mark_closed();
    }

    /// Waits until the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns `true` while the connection can carry requests.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the serializer.
    #[inline]
    #[must_use]
    pub fn serializer(&self) -> &ActionSerializer {
        &self.inner.serializer
    }
}

impl ConnectionInner {
    fn route_incoming(&self, text: &str) {
        let Some(frame) = self.serializer.correlator().handle_incoming(text) else {
            return;
        };

        match &self.inbound {
            Some(handler) => handler(frame),
            None => trace!(connection = %self.id, frame_type = %frame.frame_type, "Unrouted frame"),
        }
    }

    fn mark_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.serializer.close();
        self.state.send_replace(ConnectionState::Closed);
        debug!(connection = %self.id, "Connection closed");
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Pumps one WebSocket until either side closes it.
async fn run_socket_loop<S>(
    ws_stream: WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    inner: Arc<ConnectionInner>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    inner.state.send_if_modified(|state| {
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
            true
        } else {
            false
        }
    });
    debug!(connection = %inner.id, "Event loop started");

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => inner.route_incoming(&text),

                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %inner.id, "WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(connection = %inner.id, error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!(connection = %inner.id, "WebSocket stream ended");
                        break;
                    }

                    // Binary, Ping, Pong
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(connection = %inner.id, error = %e, "Failed to send frame");
                            break;
                        }
                    }

                    Some(SocketCommand::Close) | None => {
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    inner.mark_closed();
    debug!(connection = %inner.id, "Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
