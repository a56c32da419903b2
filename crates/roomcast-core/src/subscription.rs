//! Connection identity and the receive side of a registration.

use crate::room::RoomId;
use roomcast_protocol::EncodedFrame;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Atomic counter so IDs stay unique within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A registration with the hub, as seen by the connection.
///
/// Holds the receive side of the connection's outbound queue. The send side
/// lives in the hub, which is the only place that can close it: once the hub
/// unregisters or evicts this connection, [`Subscription::recv`] drains what
/// is left and then returns `None`.
#[derive(Debug)]
pub struct Subscription {
    id: ConnectionId,
    room_id: RoomId,
    queue: mpsc::Receiver<EncodedFrame>,
}

impl Subscription {
    pub(crate) fn new(
        id: ConnectionId,
        room_id: RoomId,
        queue: mpsc::Receiver<EncodedFrame>,
    ) -> Self {
        Self { id, room_id, queue }
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Get the room this connection belongs to.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Wait for the next outbound frame.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<EncodedFrame> {
        self.queue.recv().await
    }

    /// Take the next outbound frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Empty` if nothing is queued, `Disconnected` if the queue has
    /// been closed by the hub and drained.
    pub fn try_recv(&mut self) -> Result<EncodedFrame, mpsc::error::TryRecvError> {
        self.queue.try_recv()
    }

    /// Split into identity and queue so the queue can move into a pump task.
    #[must_use]
    pub fn into_parts(self) -> (ConnectionId, RoomId, mpsc::Receiver<EncodedFrame>) {
        (self.id, self.room_id, self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }
}
