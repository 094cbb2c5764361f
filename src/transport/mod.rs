//! Request correlation and connection lifecycle.
//!
//! This module turns a duplex, message-framed socket into an RPC channel
//! that survives timeouts, stale responses and connection replacement.
//!
//! # Architecture
//!
//! ```text
//! caller ──► ConnectionRegistry ──► Connection ──► ActionSerializer
//!                                        │                │
//!                                        │                ▼
//!                                        │         RequestCorrelator
//!                                        │                │
//!                                        ▼                ▼
//!                                   event loop ◄──── Transport (WebSocket)
//! ```
//!
//! # Request Lifecycle
//!
//! 1. `ConnectionRegistry::get_active` - Fails fast when no agent is connected
//! 2. `ActionSerializer::enqueue` - Waits for every earlier request to finish
//! 3. `RequestCorrelator::send` - Tags the frame, waits for the echoed ID
//! 4. Event loop - Feeds inbound text back into the correlator
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection state and WebSocket event loop |
//! | `correlator` | Pending requests keyed by ID |
//! | `registry` | Single active connection |
//! | `serializer` | One-in-flight FIFO queue |
//! | `socket` | Transport trait and WebSocket sender |

// ============================================================================
// Submodules
// ============================================================================

/// Connection state and WebSocket event loop.
pub mod connection;

/// Request/response correlation.
pub mod correlator;

/// Single active connection.
pub mod registry;

/// One-in-flight request queue.
pub mod serializer;

/// Transport abstraction.
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionState, InboundHandler};
pub use correlator::RequestCorrelator;
pub use registry::ConnectionRegistry;
pub use serializer::ActionSerializer;
pub use socket::{Transport, WsTransport};
