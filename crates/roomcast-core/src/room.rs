//! Room membership for Roomcast.
//!
//! A room is a named broadcast group. Its membership set maps each connection
//! to the send side of that connection's outbound queue.

use crate::subscription::ConnectionId;
use roomcast_protocol::EncodedFrame;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

/// Maximum room identifier length.
pub const MAX_ROOM_ID_LENGTH: usize = 256;

/// A room identifier. Case-sensitive, assigned by the caller.
pub type RoomId = String;

/// Validate a room identifier supplied by a client.
///
/// The hub itself accepts any key; this is for the upgrade entry point.
///
/// # Errors
///
/// Returns an error message if the identifier is unusable.
pub fn validate_room_id(room_id: &str) -> Result<(), &'static str> {
    if room_id.trim().is_empty() {
        return Err("Room ID cannot be empty");
    }
    if room_id.len() > MAX_ROOM_ID_LENGTH {
        return Err("Room ID too long");
    }
    if room_id.chars().any(char::is_control) {
        return Err("Room ID contains control characters");
    }
    Ok(())
}

/// Outcome of pushing one frame to every member of a room.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Members whose queue accepted the frame.
    pub delivered: usize,
    /// Members whose queue was full.
    pub full: Vec<ConnectionId>,
    /// Members whose queue receiver is already gone.
    pub closed: Vec<ConnectionId>,
}

impl Delivery {
    /// Check if any member has to be removed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.full.is_empty() || !self.closed.is_empty()
    }
}

/// The membership set of one room.
#[derive(Debug)]
pub struct Room {
    /// Room name.
    id: RoomId,
    /// Queue senders indexed by connection.
    members: HashMap<ConnectionId, mpsc::Sender<EncodedFrame>>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(id: impl Into<RoomId>) -> Self {
        Self {
            id: id.into(),
            members: HashMap::new(),
        }
    }

    /// Get the room ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Add a member. A previous sender under the same ID is dropped.
    pub fn insert(&mut self, connection_id: ConnectionId, sender: mpsc::Sender<EncodedFrame>) {
        debug!(room = %self.id, connection = %connection_id, "Member joined");
        self.members.insert(connection_id, sender);
    }

    /// Remove a member, closing its queue.
    ///
    /// Returns `true` if the connection was a member.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> bool {
        // Dropping the only sender is what closes the queue.
        let removed = self.members.remove(connection_id).is_some();
        if removed {
            debug!(room = %self.id, connection = %connection_id, "Member left");
        }
        removed
    }

    /// Offer a frame to every member without waiting.
    ///
    /// Members that cannot take it are reported back, not removed; the caller
    /// decides what to do with them.
    #[must_use]
    pub fn deliver(&self, frame: &EncodedFrame) -> Delivery {
        let mut delivery = Delivery::default();

        for (connection_id, sender) in &self.members {
            match sender.try_send(frame.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => delivery.full.push(connection_id.clone()),
                Err(TrySendError::Closed(_)) => delivery.closed.push(connection_id.clone()),
            }
        }

        trace!(
            room = %self.id,
            delivered = delivery.delivered,
            full = delivery.full.len(),
            closed = delivery.closed.len(),
            "Delivered frame"
        );
        delivery
    }
}
