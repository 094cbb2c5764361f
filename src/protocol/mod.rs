//! WebSocket protocol message types.
//!
//! This module defines the message format exchanged between the bridge
//! server (orchestrator side) and the browser agent.
//!
//! # Protocol Overview
//!
//! | Frame Type | Direction | Purpose |
//! |------------|-----------|---------|
//! | `<action>` | Server → Agent | Action request |
//! | `<base>_complete` | Agent → Server | Success response |
//! | `error` | Agent → Server | Failure response |
//! | `heartbeat` / `heartbeat_ack` | Both | Liveness |
//! | `connection` | Agent → Server | Hello after connect |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Typed action requests |
//! | `event` | Classification of frames the correlator does not consume |
//! | `frame` | Wire frame and reserved types |

// ============================================================================
// Submodules
// ============================================================================

/// Typed action requests.
pub mod action;

/// Unsolicited agent frames.
pub mod event;

/// Wire frame and reserved types.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::Action;
pub use event::AgentEvent;
pub use frame::{Frame, FrameKind, completion_type};
