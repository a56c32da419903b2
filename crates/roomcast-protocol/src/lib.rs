//! # roomcast-protocol
//!
//! Wire format for the Roomcast fan-out layer.
//!
//! Everything the server pushes to a room viewer is a single JSON text frame
//! wrapped in an [`Envelope`]:
//!
//! ```json
//! { "type": "new_message", "message": { "id": "...", "body": "hi", "room_id": "...", "sender_id": "..." } }
//! ```
//!
//! The payload is encoded once per broadcast into an [`EncodedFrame`], which is
//! cheap to clone for every subscriber of the room.
//!
//! ## Example
//!
//! ```rust
//! use roomcast_protocol::{codec, Envelope};
//!
//! let envelope = Envelope::new_message(serde_json::json!({ "body": "hi" }));
//! let frame = codec::encode(&envelope).unwrap();
//! assert_eq!(frame.as_str(), r#"{"type":"new_message","message":{"body":"hi"}}"#);
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, EncodedFrame, ProtocolError};
pub use envelope::Envelope;
