//! Codec for encoding and decoding Roomcast frames.
//!
//! Frames are JSON text, one envelope per WebSocket text message. Encoding
//! happens once per broadcast; the resulting [`EncodedFrame`] is shared by
//! every recipient.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::envelope::Envelope;

/// Maximum encoded frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A frame that has already been serialized.
///
/// Cloning is a reference-count bump, so one encoding can be handed to any
/// number of outbound queues.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncodedFrame(Arc<str>);

impl EncodedFrame {
    /// Get the frame as JSON text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the encoded size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncodedFrame").field(&self.as_str()).finish()
    }
}

impl fmt::Display for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for EncodedFrame {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Encode any serializable value to a frame.
///
/// # Errors
///
/// Returns an error if serialization fails or the result is too large.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<EncodedFrame, ProtocolError> {
    let text = serde_json::to_string(value).map_err(ProtocolError::Encode)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(EncodedFrame(Arc::from(text)))
}

/// Decode an envelope from frame text.
///
/// # Errors
///
/// Returns an error if the text is not a valid envelope.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<Envelope<T>, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}
