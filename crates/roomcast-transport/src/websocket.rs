//! WebSocket transport implementation.
//!
//! Adapts an upgraded axum [`WebSocket`] to the reader/writer traits.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::trace;

use crate::traits::{FrameReader, FrameWriter, Inbound, TransportError};

/// Read half of an axum WebSocket.
pub struct WebSocketReader {
    stream: SplitStream<WebSocket>,
}

/// Write half of an axum WebSocket.
pub struct WebSocketWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

/// Split an upgraded socket into its two halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = socket.split();
    (
        WebSocketReader { stream },
        WebSocketWriter {
            sink,
            closed: false,
        },
    )
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(Inbound::Text(text.len()))),
            Some(Ok(Message::Binary(data))) => Ok(Some(Inbound::Binary(data.len()))),
            // axum answers pings on its own
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(Some(Inbound::Control)),
            Some(Ok(Message::Close(frame))) => {
                trace!(?frame, "Received close frame");
                Ok(None)
            }
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        self.sink
            .send(Message::Text(text.to_owned()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(()); // Already closed
        }

        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
