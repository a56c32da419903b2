//! Room and message persistence.
//!
//! The HTTP layer talks to a [`Store`]; the server ships [`MemoryStore`].

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

/// A message posted to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub room_id: String,
    pub sender_id: String,
}

/// A message that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub body: String,
    pub room_id: String,
    pub sender_id: String,
}

/// Store errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No room with the given ID.
    #[error("room not found")]
    RoomNotFound,

    /// No messages could be listed for the given room.
    #[error("no messages found for room")]
    MessagesNotFound,

    /// The ID is not in the expected format.
    #[error("invalid ID format: {0:?}")]
    InvalidId(String),
}

/// Persistence for rooms and their messages.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create a room with the given name.
    async fn create_room(&self, name: String) -> Result<Room, StoreError>;

    /// Look up a room by ID.
    async fn get_room(&self, id: &str) -> Result<Room, StoreError>;

    /// Rename a room.
    async fn update_room_name(&self, id: &str, name: String) -> Result<Room, StoreError>;

    /// Store a message in an existing room.
    async fn post_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// All messages of a room, oldest first.
    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<Message>, StoreError>;
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn check_id(id: &str) -> Result<(), StoreError> {
    Uuid::try_parse(id)
        .map(|_| ())
        .map_err(|_| StoreError::InvalidId(id.to_string()))
}

/// In-memory [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: DashMap<String, Room>,
    messages: DashMap<String, Vec<Message>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_room(&self, name: String) -> Result<Room, StoreError> {
        let room = Room {
            id: generate_id(),
            name,
        };

        self.messages.insert(room.id.clone(), Vec::new());
        self.rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn get_room(&self, id: &str) -> Result<Room, StoreError> {
        check_id(id)?;
        self.rooms
            .get(id)
            .map(|room| room.value().clone())
            .ok_or(StoreError::RoomNotFound)
    }

    async fn update_room_name(&self, id: &str, name: String) -> Result<Room, StoreError> {
        check_id(id)?;
        let mut room = self.rooms.get_mut(id).ok_or(StoreError::RoomNotFound)?;
        room.name = name;
        Ok(room.value().clone())
    }

    async fn post_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        check_id(&message.room_id)?;
        let mut messages = self
            .messages
            .get_mut(&message.room_id)
            .ok_or(StoreError::RoomNotFound)?;

        let message = Message {
            id: generate_id(),
            body: message.body,
            room_id: message.room_id,
            sender_id: message.sender_id,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn messages_for_room(&self, room_id: &str) -> Result<Vec<Message>, StoreError> {
        check_id(room_id)?;
        self.messages
            .get(room_id)
            .map(|messages| messages.value().clone())
            .ok_or(StoreError::MessagesNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(room_id: &str, body: &str) -> NewMessage {
        NewMessage {
            body: body.to_string(),
            room_id: room_id.to_string(),
            sender_id: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_room() {
        let store = MemoryStore::new();
        let room = store.create_room("lobby".to_string()).await.unwrap();

        assert_eq!(room.id.len(), 32);
        assert_eq!(store.get_room(&room.id).await.unwrap(), room);
    }

    #[tokio::test]
    async fn test_get_room_errors() {
        let store = MemoryStore::new();

        assert_eq!(
            store.get_room("not-an-id").await,
            Err(StoreError::InvalidId("not-an-id".to_string()))
        );
        assert_eq!(
            store.get_room(&generate_id()).await,
            Err(StoreError::RoomNotFound)
        );
    }

    #[tokio::test]
    async fn test_update_room_name() {
        let store = MemoryStore::new();
        let room = store.create_room("old".to_string()).await.unwrap();

        let updated = store
            .update_room_name(&room.id, "new".to_string())
            .await
            .unwrap();
        assert_eq!(updated.name, "new");
        assert_eq!(store.get_room(&room.id).await.unwrap().name, "new");

        assert_eq!(
            store.update_room_name(&generate_id(), "x".to_string()).await,
            Err(StoreError::RoomNotFound)
        );
    }

    #[tokio::test]
    async fn test_messages_in_insertion_order() {
        let store = MemoryStore::new();
        let room = store.create_room("lobby".to_string()).await.unwrap();

        assert!(store.messages_for_room(&room.id).await.unwrap().is_empty());

        let first = store.post_message(new_message(&room.id, "one")).await.unwrap();
        let second = store.post_message(new_message(&room.id, "two")).await.unwrap();
        assert_ne!(first.id, second.id);

        let bodies: Vec<_> = store
            .messages_for_room(&room.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_post_to_unknown_room() {
        let store = MemoryStore::new();
        let room_id = generate_id();

        assert_eq!(
            store.post_message(new_message(&room_id, "hi")).await,
            Err(StoreError::RoomNotFound)
        );
        assert_eq!(
            store.messages_for_room(&room_id).await,
            Err(StoreError::MessagesNotFound)
        );
    }
}
