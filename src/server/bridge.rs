//! Bridge server.
//!
//! The orchestrator side of the bridge. It listens on the agent's fixed
//! port, keeps the newest agent connection as the active one, and exposes
//! request methods that go through that connection's serializer.
//!
//! # Example
//!
//! ```ignore
//! use browser_bridge::{Action, BridgeConfig, BridgeServer};
//!
//! let server = BridgeServer::start(BridgeConfig::from_env()?).await?;
//! server.wait_for_agent(Duration::from_secs(60)).await?;
//!
//! let snapshot = server.execute(&Action::Snapshot).await?;
//! server.shutdown();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Action, AgentEvent, Frame};
use crate::transport::{Connection, ConnectionRegistry, InboundHandler};

use super::ListenerBootstrap;

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the agent event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// BridgeServer
// ============================================================================

/// State shared with background tasks.
struct ServerInner {
    config: BridgeConfig,
    port: u16,
    registry: Arc<ConnectionRegistry>,
    events: broadcast::Sender<AgentEvent>,
    shutdown: watch::Sender<bool>,
    /// Sequence number handed to the next accepted socket.
    accept_seq: AtomicU64,
    /// Sequence number of the socket currently installed.
    installed_seq: Mutex<u64>,
}

impl ServerInner {
    fn new(config: BridgeConfig, port: u16) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            port,
            registry: Arc::new(ConnectionRegistry::new()),
            events,
            shutdown,
            accept_seq: AtomicU64::new(1),
            installed_seq: Mutex::new(0),
        }
    }
}

/// WebSocket server the browser agent connects to.
///
/// Cheap to clone; clones share the listener and registry.
#[derive(Clone)]
pub struct BridgeServer {
    inner: Arc<ServerInner>,
}

// ============================================================================
// BridgeServer - Constructor
// ============================================================================

impl BridgeServer {
    /// Acquires the port and starts accepting agents.
    ///
    /// # Errors
    ///
    /// - [`Error::PortUnavailable`] if the port cannot be freed in time
    /// - [`Error::Io`] if binding fails otherwise
    pub async fn start(config: BridgeConfig) -> Result<Self> {
        let bootstrap = ListenerBootstrap::new(&config);
        Self::start_with(config, &bootstrap).await
    }

    /// Starts with a custom [`ListenerBootstrap`].
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn start_with(config: BridgeConfig, bootstrap: &ListenerBootstrap) -> Result<Self> {
        let listener = bootstrap.acquire(config.port).await?;
        let port = listener.local_addr()?.port();

        let inner = Arc::new(ServerInner::new(config, port));
        let shutdown_rx = inner.shutdown.subscribe();

        tokio::spawn(accept_loop(
            Arc::clone(&inner),
            listener,
            shutdown_rx.clone(),
        ));

        if let Some(period) = inner.config.heartbeat_interval {
            tokio::spawn(heartbeat_loop(
                Arc::clone(&inner.registry),
                period,
                shutdown_rx,
            ));
        }

        info!(port, "Bridge server listening");

        Ok(Self { inner })
    }
}

// ============================================================================
// BridgeServer - Public API
// ============================================================================

impl BridgeServer {
    /// Sends a typed action to the agent and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no agent is connected
    /// - [`Error::RequestTimeout`] if the agent does not answer in time
    /// - [`Error::Remote`] if the agent reports failure
    /// - [`Error::ConnectionClosed`] if the agent disconnects first
    pub async fn execute(&self, action: &Action) -> Result<Value> {
        self.inner.registry.execute(action).await
    }

    /// Sends a request of any type to the agent.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn call(&self, request_type: &str, payload: Value) -> Result<Value> {
        self.inner.registry.enqueue(request_type, payload).await
    }

    /// Waits until an agent is connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if none connects within `wait`.
    pub async fn wait_for_agent(&self, wait: Duration) -> Result<()> {
        self.inner.registry.wait_for_active(wait).await.map(|_| ())
    }

    /// Subscribes to unsolicited agent frames.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.inner.events.subscribe()
    }

    /// Returns `true` if an agent is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.registry.is_connected()
    }

    /// Returns the connection registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Returns the WebSocket URL agents should dial.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.inner.config.bind_ip, self.inner.port)
    }

    /// Stops accepting agents and closes the active connection.
    ///
    /// Queued and in-flight requests fail with [`Error::ConnectionClosed`].
    pub fn shutdown(&self) {
        info!(port = self.inner.port, "Bridge server shutting down");
        self.inner.shutdown.send_replace(true);
        self.inner.registry.close();
    }
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Accepts agents until shutdown.
async fn accept_loop(
    inner: Arc<ServerInner>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("Accept loop started");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let seq = inner.accept_seq.fetch_add(1, Ordering::Relaxed);
                        let inner = Arc::clone(&inner);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(&inner, stream, addr, seq).await {
                                warn!(error = %e, ?addr, "Connection handling failed");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Accept failed"),
                }
            }

            _ = shutdown_rx.changed() => break,
        }
    }

    debug!("Accept loop terminated");
}

/// Upgrades one TCP stream and installs it as the active connection.
///
/// `seq` is the accept order. An upgrade that finishes after a later
/// socket was already installed is dropped.
async fn handle_connection(
    inner: &ServerInner,
    stream: TcpStream,
    addr: SocketAddr,
    seq: u64,
) -> Result<()> {
    debug!(?addr, seq, "New TCP connection");

    let upgrade_timeout = inner.config.connect_timeout;
    let ws_stream = timeout(upgrade_timeout, tokio_tungstenite::accept_async(stream))
        .await
        .map_err(|_| Error::connection_timeout(upgrade_timeout.as_millis() as u64))?
        .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

    if *inner.shutdown.borrow() {
        debug!(?addr, "Dropping connection accepted during shutdown");
        return Ok(());
    }

    let connection = Connection::websocket(
        ws_stream,
        inner.config.request_timeout,
        Some(event_router(inner.events.clone())),
    );

    info!(connection = %connection.id(), ?addr, "Agent connected");
    install(inner, seq, connection);

    Ok(())
}

/// Makes `connection` active unless a later-accepted one already is.
fn install(inner: &ServerInner, seq: u64, connection: Connection) {
    let mut installed = inner.installed_seq.lock();

    if seq < *installed {
        info!(
            connection = %connection.id(),
            seq,
            active_seq = *installed,
            "Dropping upgrade older than active connection"
        );
        connection.close();
        return;
    }

    *installed = seq;
    inner.registry.set_active(connection);
}

/// Sends a heartbeat to the active agent on a fixed period.
async fn heartbeat_loop(
    registry: Arc<ConnectionRegistry>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Ok(connection) = registry.get_active() else {
                    continue;
                };
                if !connection.is_open() {
                    continue;
                }
                match connection.send_frame(&Frame::heartbeat(RequestId::generate())) {
                    Ok(()) => trace!(connection = %connection.id(), "Heartbeat sent"),
                    Err(e) => debug!(connection = %connection.id(), error = %e, "Heartbeat not sent"),
                }
            }

            _ = shutdown_rx.changed() => break,
        }
    }
}

// ============================================================================
// Event Routing
// ============================================================================

/// Builds the inbound handler that logs and broadcasts agent frames.
fn event_router(events: broadcast::Sender<AgentEvent>) -> InboundHandler {
    Box::new(move |frame| {
        let Some(event) = AgentEvent::from_frame(frame) else {
            return;
        };

        log_event(&event);

        // No subscribers is fine.
        let _ = events.send(event);
    })
}

fn log_event(event: &AgentEvent) {
    match event {
        AgentEvent::Hello {
            url,
            title,
            user_agent,
            ..
        } => info!(?url, ?title, ?user_agent, "Agent hello"),

        AgentEvent::NavigationChanged { url, title } => {
            debug!(%url, %title, "Agent navigated");
        }

        AgentEvent::Failure { message } => warn!(%message, "Agent reported error"),

        AgentEvent::LateCompletion { base_type, id } => {
            debug!(%base_type, %id, "Completion for request no longer pending");
        }

        AgentEvent::Unknown { frame_type, .. } => {
            debug!(%frame_type, "Unhandled agent frame");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
