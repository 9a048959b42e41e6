//! Per-device connection handle.

use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

/// Error returned when a frame cannot be handed to the writer task.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The writer task has exited; the peer is gone.
    #[error("connection closed")]
    Closed,
    /// The outbound queue is full.
    #[error("outbound queue full")]
    Backpressure,
}

/// A registered device's connection.
///
/// Owns the sending half of a device session: frames enqueued here are
/// drained by the writer task holding the `WebSocket` sink. The reading half
/// stays with the session's liveness loop, so sends never contend with the
/// blocking receive.
pub struct DeviceConnection {
    /// Process-unique connection ID, used only for log correlation, so two
    /// successive connections for the same gym ID are distinguishable.
    pub id: String,
    gym_id: String,
    tx: mpsc::Sender<Message>,
    /// When this connection completed registration.
    pub connected_at: Instant,
}

impl DeviceConnection {
    /// Create a handle for a freshly registered device.
    pub fn new(gym_id: impl Into<String>, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            gym_id: gym_id.into(),
            tx,
            connected_at: Instant::now(),
        }
    }

    /// The gym ID this connection registered under.
    pub fn gym_id(&self) -> &str {
        &self.gym_id
    }

    /// Enqueue one text frame for delivery. No retry.
    pub fn send_text(&self, frame: impl Into<String>) -> Result<(), SendError> {
        let frame: String = frame.into();
        match self.tx.try_send(Message::Text(frame.into())) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::Backpressure),
        }
    }

    /// Ask the writer task to close the socket.
    ///
    /// Best-effort: a connection already tearing down has no writer left to
    /// tell.
    pub fn close(&self) {
        let _ = self.tx.try_send(Message::Close(None));
    }

    /// Connection duration.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
