//! Transport abstraction traits for Roomcast.
//!
//! A connection's socket is split into a read half and a write half so the
//! two pumps can run concurrently without sharing a lock.

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Something read from the client.
///
/// The server never interprets inbound data, so only its shape is kept for
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame of the given length.
    Text(usize),
    /// A binary frame of the given length.
    Binary(usize),
    /// A ping, pong or other control frame.
    Control,
}

/// The read half of a client socket.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next frame.
    ///
    /// Returns `None` once the peer has closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError>;
}

/// The write half of a client socket.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Send a close frame and shut the write half.
    async fn close(&mut self) -> Result<(), TransportError>;
}
