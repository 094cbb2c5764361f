//! In-memory transport for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::Frame;

use super::Transport;

/// Records every frame sent through it.
pub(crate) struct RecordingTransport {
    sent_tx: mpsc::UnboundedSender<String>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

/// Receiving side of a [`RecordingTransport`].
pub(crate) struct SentFrames {
    rx: mpsc::UnboundedReceiver<String>,
}

impl RecordingTransport {
    pub(crate) fn new() -> (Arc<Self>, SentFrames) {
        let (sent_tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sent_tx,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        });
        (transport, SentFrames { rx })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn send_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.sent_tx.send(text).map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl SentFrames {
    /// Waits for the next sent frame.
    pub(crate) async fn next(&mut self) -> Frame {
        let text = timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("frame should be sent within 5s")
            .expect("transport dropped");
        Frame::from_json(&text).expect("sent frame should parse")
    }

    /// Returns a frame if one was already sent.
    pub(crate) fn try_next(&mut self) -> Option<Frame> {
        self.rx
            .try_recv()
            .ok()
            .map(|text| Frame::from_json(&text).expect("sent frame should parse"))
    }
}
