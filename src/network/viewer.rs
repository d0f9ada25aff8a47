//! Viewer connection handle
//!
//! Each viewer owns a bounded outbound channel drained by its socket writer
//! task. Dropping the handle's sender (by removing it from the hub) ends the
//! writer, which closes the socket.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::protocol::OutboundFrame;

/// Registered viewer
pub struct ViewerHandle {
    id: String,
    outbound: mpsc::Sender<OutboundFrame>,
    /// Arrival of the last inbound frame (or of the connection)
    last_seen: Mutex<Instant>,
}

impl ViewerHandle {
    /// Create a handle and the receiving end its writer drains
    pub fn channel(id: impl Into<String>, buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: id.into(),
            outbound: tx,
            last_seen: Mutex::new(Instant::now()),
        };
        (handle, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Time since the viewer last sent anything
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Queue a frame for this viewer, bounded by `timeout`
    pub async fn send(&self, frame: OutboundFrame, timeout: Duration) -> Result<(), TransportError> {
        match tokio::time::timeout(timeout, self.outbound.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed(self.id.clone())),
            Err(_) => Err(TransportError::SendTimeout(self.id.clone())),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
