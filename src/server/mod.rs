//! Server side of the bridge.
//!
//! The server owns the listening port the agent dials, accepts agent
//! connections, and routes caller requests to the active one.
//!
//! # Startup
//!
//! 1. `ListenerBootstrap::acquire` - Reclaim the fixed port and bind it
//! 2. `BridgeServer::start` - Spawn the accept loop
//! 3. Agent connects - Installed as the active connection, evicting any older one
//! 4. `BridgeServer::execute` - Send actions through the active connection
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bootstrap` | Port reclamation and bind polling |
//! | `bridge` | Accept loop, heartbeat and request API |
//! | `reclaim` | Terminating stale port holders |

// ============================================================================
// Submodules
// ============================================================================

/// Port reclamation and bind polling.
pub mod bootstrap;

/// Accept loop, heartbeat and request API.
pub mod bridge;

/// Terminating stale port holders.
pub mod reclaim;

// ============================================================================
// Re-exports
// ============================================================================

pub use bootstrap::ListenerBootstrap;
pub use bridge::BridgeServer;
pub use reclaim::{NoopReclaimer, PortReclaimer, ProcessPortReclaimer};
