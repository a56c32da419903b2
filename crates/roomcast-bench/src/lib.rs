//! Shared fixtures for the Roomcast benchmarks.

use roomcast_core::{HubHandle, Subscription};
use serde::Serialize;

/// Room every benchmark broadcasts to.
pub const BENCH_ROOM: &str = "bench-room";

/// A message shaped like the ones the server stores and broadcasts.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub body: String,
    pub room_id: String,
    pub sender_id: String,
}

/// Build a message with a body of `body_len` bytes.
#[must_use]
pub fn chat_message(body_len: usize) -> ChatMessage {
    ChatMessage {
        id: "6f1c2a9d4b8e4f0f9a3c7d2e1b5a6c8d".to_string(),
        body: "x".repeat(body_len),
        room_id: BENCH_ROOM.to_string(),
        sender_id: "bench-user".to_string(),
    }
}

/// Register `members` connections in [`BENCH_ROOM`] and wait until the hub
/// has applied them.
pub async fn join(hub: &HubHandle, members: usize) -> Vec<Subscription> {
    let subscriptions = (0..members).map(|_| hub.register(BENCH_ROOM)).collect();
    hub.flush().await;
    subscriptions
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_core::{Hub, HubConfig};

    #[tokio::test]
    async fn test_join_registers_members() {
        let (hub, _task) = Hub::spawn(HubConfig::default());
        let subscriptions = join(&hub, 3).await;

        assert_eq!(subscriptions.len(), 3);
        assert_eq!(hub.connection_count(BENCH_ROOM), 3);
        assert_eq!(chat_message(10).body.len(), 10);
    }
}
