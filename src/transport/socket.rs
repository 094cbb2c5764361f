//! Transport seam between the correlation layer and the socket.
//!
//! The correlator only needs to queue text frames and close the socket. The
//! WebSocket implementation forwards both to the connection's event loop
//! task over a channel, so sending never blocks the caller.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Transport
// ============================================================================

/// Duplex, message-framed socket as seen by the correlation layer.
pub trait Transport: Send + Sync + 'static {
    /// Queues a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the socket is gone.
    fn send_text(&self, text: String) -> Result<()>;

    /// Closes the socket. Calling it more than once is harmless.
    fn close(&self);
}

// ============================================================================
// SocketCommand
// ============================================================================

/// Commands for a socket event loop.
#[derive(Debug)]
pub(crate) enum SocketCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket and stop the loop.
    Close,
}

// ============================================================================
// WsTransport
// ============================================================================

/// [`Transport`] backed by a WebSocket event loop task.
#[derive(Debug, Clone)]
pub struct WsTransport {
    /// Channel to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl WsTransport {
    /// Creates a transport and the receiver its event loop reads from.
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<SocketCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (Self { command_tx }, command_rx)
    }
}

impl Transport for WsTransport {
    fn send_text(&self, text: String) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        if self.command_tx.send(SocketCommand::Close).is_err() {
            trace!("Socket loop already stopped");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_forwards_to_loop() {
        let (transport, mut command_rx) = WsTransport::channel();
        transport.send_text("hello".into()).expect("send");

        match command_rx.try_recv() {
            Ok(SocketCommand::Send(text)) => assert_eq!(text, "hello"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_close_forwards_to_loop() {
        let (transport, mut command_rx) = WsTransport::channel();
        transport.close();
        assert!(matches!(command_rx.try_recv(), Ok(SocketCommand::Close)));
    }

    #[test]
    fn test_send_after_loop_stopped() {
        let (transport, command_rx) = WsTransport::channel();
        drop(command_rx);

        let err = transport.send_text("late".into()).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));

        // Closing a stopped transport is a no-op.
        transport.close();
    }
}
