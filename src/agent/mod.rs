//! Agent side of the bridge.
//!
//! The agent runs next to the browser. It dials the bridge server, answers
//! action requests through an [`ActionHandler`], and reconnects with
//! exponential backoff when the socket drops.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay formula |
//! | `client` | Connection loop and handle |
//! | `handler` | Action handler trait |
//! | `reconnect` | Reconnect state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delay formula.
pub mod backoff;

/// Connection loop and handle.
pub mod client;

/// Action handler trait.
pub mod handler;

/// Reconnect state machine.
pub mod reconnect;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::backoff_delay;
pub use client::{AgentClient, AgentHandle};
pub use handler::ActionHandler;
pub use reconnect::{ReconnectManager, ReconnectState};
