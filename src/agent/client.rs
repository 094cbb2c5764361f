//! Agent-side WebSocket client.
//!
//! [`AgentClient`] dials the bridge server, says hello, and answers every
//! request with its [`ActionHandler`]. When the socket drops it redials under
//! [`ReconnectManager`] control until the retry budget runs out.
//!
//! # Connection Loop
//!
//! ```text
//! Connecting ──dial ok──► Connected ──socket closed──► Reconnecting
//!     ▲                                                    │
//!     └──────────────────── backoff timer ◄────────────────┘
//! ```
//!
//! A failed dial counts as a close while connecting. Each open socket gets a
//! fresh [`Connection`] installed in the agent's [`ConnectionRegistry`], so
//! agent-originated requests never reach a dead socket.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Sleep, sleep, timeout};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, trace, warn};

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameKind};
use crate::transport::{Connection, ConnectionRegistry, InboundHandler};

use super::{ActionHandler, ReconnectManager, ReconnectState};

// ============================================================================
// Types
// ============================================================================

/// Commands from [`AgentHandle`] to the connection loop.
#[derive(Debug)]
enum AgentControl {
    /// Drop the current socket and dial now with a fresh budget.
    Reconnect,
    /// Close everything and stop.
    Shutdown,
}

/// Pending backoff timer. At most one exists.
type ReconnectTimer = Option<Pin<Box<Sleep>>>;

// ============================================================================
// AgentClient
// ============================================================================

/// Builder for the agent connection loop.
pub struct AgentClient {
    config: AgentConfig,
    handler: Arc<dyn ActionHandler>,
    hello: Option<Value>,
}

impl AgentClient {
    /// Creates a client that answers requests with `handler`.
    #[must_use]
    pub fn new(config: AgentConfig, handler: impl ActionHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            hello: None,
        }
    }

    /// Overrides the hello payload sent after each connect.
    ///
    /// Defaults to `{ "userAgent": <agent_name> }`.
    #[inline]
    #[must_use]
    pub fn with_hello(mut self, data: Value) -> Self {
        self.hello = Some(data);
        self
    }

    /// Starts the connection loop in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the server URL is invalid.
    pub fn spawn(self) -> Result<AgentHandle> {
        self.config.validate()?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ReconnectState::Disconnected);
        let registry = Arc::new(ConnectionRegistry::new());

        info!(url = %self.config.url, "Starting agent");
        let task = tokio::spawn(self.run(control_rx, state_tx, Arc::clone(&registry)));

        Ok(AgentHandle {
            control_tx,
            state_rx,
            registry,
            task,
        })
    }

    /// Drives [`ReconnectManager`] until shutdown.
    async fn run(
        self,
        mut control_rx: mpsc::UnboundedReceiver<AgentControl>,
        state_tx: watch::Sender<ReconnectState>,
        registry: Arc<ConnectionRegistry>,
    ) {
        let mut manager = ReconnectManager::new(
            self.config.max_reconnect_attempts,
            self.config.base_reconnect_delay,
        );
        let mut timer: ReconnectTimer = None;
        let mut current: Option<Connection> = None;

        manager.start();

        loop {
            state_tx.send_replace(manager.state());

            tokio::select! {
                result = self.dial(), if manager.state() == ReconnectState::Connecting => {
                    match result {
                        Ok(connection) => {
                            manager.on_open();
                            info!(connection = %connection.id(), url = %self.config.url, "Connected to server");
                            registry.set_active(connection.clone());
                            current = Some(connection);
                        }
                        Err(e) => {
                            warn!(error = %e, url = %self.config.url, "Connection attempt failed");
                            timer = manager.on_closed().map(|delay| Box::pin(sleep(delay)));
                        }
                    }
                }

                () = wait_closed(current.as_ref()) => {
                    if let Some(connection) = current.take() {
                        info!(connection = %connection.id(), "Connection closed");
                    }
                    timer = manager.on_closed().map(|delay| Box::pin(sleep(delay)));
                }

                () = wait_timer(&mut timer) => {
                    timer = None;
                    manager.on_timer_fired();
                }

                control = control_rx.recv() => {
                    match control {
                        Some(AgentControl::Reconnect) => {
                            timer = None;
                            if let Some(connection) = current.take() {
                                connection.close();
                            }
                            manager.manual_reconnect();
                        }
                        Some(AgentControl::Shutdown) | None => break,
                    }
                }
            }
        }

        registry.close();
        manager.stop();
        state_tx.send_replace(manager.state());
        debug!("Agent loop terminated");
    }

    /// Opens one socket, sends hello and starts request dispatch.
    ///
    /// A handshake that does not finish within `connect_timeout` counts as a
    /// failed dial.
    async fn dial(&self) -> Result<Connection> {
        let connect_timeout = self.config.connect_timeout;
        let (ws_stream, _response) = timeout(connect_timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let inbound: InboundHandler = Box::new(move |frame| {
            let _ = frame_tx.send(frame);
        });

        let connection =
            Connection::websocket(ws_stream, self.config.request_timeout, Some(inbound));

        let hello = self
            .hello
            .clone()
            .unwrap_or_else(|| json!({ "userAgent": self.config.agent_name }));
        connection.send_frame(&Frame::hello(hello))?;

        tokio::spawn(dispatch_requests(
            connection.clone(),
            frame_rx,
            Arc::clone(&self.handler),
        ));

        Ok(connection)
    }
}

// ============================================================================
// AgentHandle
// ============================================================================

/// Handle to a running agent.
pub struct AgentHandle {
    control_tx: mpsc::UnboundedSender<AgentControl>,
    state_rx: watch::Receiver<ReconnectState>,
    registry: Arc<ConnectionRegistry>,
    task: JoinHandle<()>,
}

impl AgentHandle {
    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ReconnectState {
        *self.state_rx.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ReconnectState> {
        self.state_rx.clone()
    }

    /// Waits until the agent reaches `target`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if `target` is not reached within `wait`
    /// - [`Error::ConnectionClosed`] if the agent loop has stopped
    pub async fn wait_for_state(&self, target: ReconnectState, wait: Duration) -> Result<()> {
        let mut rx = self.state_rx.clone();

        match timeout(wait, rx.wait_for(|state| *state == target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::connection_timeout(wait.as_millis() as u64)),
        }
    }

    /// Drops the current socket and dials immediately with a fresh budget.
    ///
    /// Works from any state, including [`ReconnectState::GivenUp`].
    pub fn reconnect(&self) {
        if self.control_tx.send(AgentControl::Reconnect).is_err() {
            warn!("Reconnect requested after agent stopped");
        }
    }

    /// Returns the registry holding the current connection.
    ///
    /// Use it to send agent-originated requests to the server.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stops the loop and closes the connection.
    pub async fn shutdown(self) {
        let _ = self.control_tx.send(AgentControl::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Agent task ended abnormally");
        }
    }
}

// ============================================================================
// Request Dispatch
// ============================================================================

/// Answers server requests on one connection, one at a time.
async fn dispatch_requests(
    connection: Connection,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    handler: Arc<dyn ActionHandler>,
) {
    loop {
        let frame = tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            () = connection.closed() => break,
        };

        let reply = match frame.kind() {
            FrameKind::Heartbeat => Frame::heartbeat_ack(frame.id),

            FrameKind::Request => {
                debug!(id = %frame.id, action_type = %frame.frame_type, "Handling request");
                match handler.handle(&frame.frame_type, frame.data).await {
                    Ok(data) => Frame::completion(frame.id, &frame.frame_type, data),
                    Err(e) => {
                        debug!(action_type = %frame.frame_type, error = %e, "Request failed");
                        Frame::failure(frame.id, e.to_string())
                    }
                }
            }

            kind => {
                trace!(?kind, frame_type = %frame.frame_type, "Ignoring frame");
                continue;
            }
        };

        if let Err(e) = connection.send_frame(&reply) {
            debug!(connection = %connection.id(), error = %e, "Reply not sent");
            break;
        }
    }

    trace!(connection = %connection.id(), "Dispatch stopped");
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves when `connection` closes; never if there is none.
async fn wait_closed(connection: Option<&Connection>) {
    match connection {
        Some(connection) => connection.closed().await,
        None => pending().await,
    }
}

/// Resolves when the timer fires; never if there is none.
async fn wait_timer(timer: &mut ReconnectTimer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    struct Unreachable;

    #[async_trait::async_trait]
    impl ActionHandler for Unreachable {
        async fn handle(&self, action_type: &str, _data: Value) -> Result<Value> {
            Err(Error::remote(format!("Unexpected request: {action_type}")))
        }
    }

    /// Accepts TCP connections and never answers the WebSocket upgrade.
    async fn silent_listener() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("addr"));

        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        (url, holder)
    }

    #[tokio::test]
    async fn test_stalled_handshake_counts_as_failed_dial() {
        let (url, holder) = silent_listener().await;
        let config = AgentConfig::new()
            .with_url(url)
            .with_connect_timeout(Duration::from_millis(100))
            .with_max_reconnect_attempts(1)
            .with_base_reconnect_delay(Duration::from_millis(10));

        let agent = AgentClient::new(config, Unreachable).spawn().expect("spawn");

        agent
            .wait_for_state(ReconnectState::GivenUp, Duration::from_secs(5))
            .await
            .expect("agent gives up on a listener that never upgrades");
        assert!(agent.registry().get_active().is_err());

        agent.shutdown().await;
        holder.abort();
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_on_spawn() {
        let config = AgentConfig::new().with_url("http://localhost:8080");
        let result = AgentClient::new(config, Unreachable).spawn();
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
