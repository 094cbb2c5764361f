//! Browser Bridge - request/response RPC between an orchestrator and a browser agent.
//!
//! This library connects a tool-calling process (the server) to an agent
//! running next to a browser (the client) over a single local WebSocket.
//! Each browser action is one request frame with a fresh ID; the agent's
//! reply echoes that ID.
//!
//! # Architecture
//!
//! The bridge follows a client-server model:
//!
//! - **Server**: Listens on a fixed port, sends actions, awaits results
//! - **Agent**: Dials the server, executes actions, reconnects on drop
//!
//! Key design principles:
//!
//! - Responses are matched by ID, never by arrival order
//! - At most one request in flight per connection
//! - At most one active connection; a newer agent evicts the older one
//! - Every request ends in a result, a remote error, a timeout, or a close
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use browser_bridge::{Action, BridgeConfig, BridgeServer, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = BridgeServer::start(BridgeConfig::from_env()?).await?;
//!     println!("Waiting for agent on {}", server.ws_url());
//!
//!     server.wait_for_agent(Duration::from_secs(60)).await?;
//!
//!     server
//!         .execute(&Action::Navigate {
//!             url: "https://example.com".into(),
//!         })
//!         .await?;
//!     let snapshot = server.execute(&Action::Snapshot).await?;
//!     println!("{snapshot}");
//!
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Agent client, reconnect state machine |
//! | [`config`] | Server and agent configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Request and connection IDs |
//! | [`protocol`] | Wire frames and typed actions |
//! | [`server`] | Bridge server and port acquisition |
//! | [`transport`] | Correlation, serialization, connection registry |

// ============================================================================
// Modules
// ============================================================================

/// Agent side: client loop, reconnect and action handling.
///
/// Use [`AgentClient`] with an [`ActionHandler`] to serve requests.
pub mod agent;

/// Server and agent configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// WebSocket protocol message types.
pub mod protocol;

/// Server side: listener bootstrap and bridge server.
pub mod server;

/// Request correlation and connection lifecycle.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Agent types
pub use agent::{ActionHandler, AgentClient, AgentHandle, ReconnectManager, ReconnectState};

// Configuration
pub use config::{AgentConfig, BridgeConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, RequestId};

// Protocol types
pub use protocol::{Action, AgentEvent, Frame, FrameKind};

// Server types
pub use server::{BridgeServer, ListenerBootstrap, NoopReclaimer, PortReclaimer, ProcessPortReclaimer};

// Transport types
pub use transport::{
    ActionSerializer, Connection, ConnectionRegistry, ConnectionState, RequestCorrelator,
    Transport,
};
