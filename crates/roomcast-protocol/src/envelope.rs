//! Envelope types for the Roomcast wire format.
//!
//! An envelope is the outermost JSON object of every frame pushed to a room
//! viewer. The `type` tag tells the client how to interpret the rest.

use serde::{Deserialize, Serialize};

/// A server-to-client envelope.
///
/// `T` is the persisted representation carried by the envelope; the protocol
/// crate does not care what it looks like as long as it serializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope<T> {
    /// A message was created in the room.
    #[serde(rename = "new_message")]
    NewMessage {
        /// The persisted message.
        message: T,
    },
}

impl<T> Envelope<T> {
    /// Wrap a newly created message.
    #[must_use]
    pub fn new_message(message: T) -> Self {
        Envelope::NewMessage { message }
    }

    /// Consume the envelope and return what it carries.
    pub fn into_inner(self) -> T {
        match self {
            Envelope::NewMessage { message } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let envelope = Envelope::new_message(json!({ "body": "hi" }));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value, json!({ "type": "new_message", "message": { "body": "hi" } }));
    }

    #[test]
    fn test_envelope_rejects_unknown_type() {
        let result: Result<Envelope<serde_json::Value>, _> =
            serde_json::from_str(r#"{"type":"typing","message":{}}"#);
        assert!(result.is_err());
    }
}
