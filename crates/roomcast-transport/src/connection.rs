//! Connection lifecycle.
//!
//! ```text
//! Connecting ──register──▶ Active ──(peer close | read error |
//!                                    queue closed | write error)──▶ Closing ──▶ Closed
//! ```
//!
//! Whatever ends the connection, teardown is the same: unregister (the hub
//! ignores repeats), let the outbound pump finish, drop the socket.

use crate::traits::{FrameReader, FrameWriter};
use roomcast_core::{ConnectionId, HubHandle, RoomId};
use roomcast_protocol::EncodedFrame;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, trace, warn};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a connection left the `Active` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the connection.
    PeerClosed,
    /// Reading from the client failed.
    ReadError,
    /// The hub closed the outbound queue (eviction or shutdown).
    QueueClosed,
    /// Writing to the client failed.
    WriteError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::ReadError => "read error",
            CloseReason::QueueClosed => "queue closed",
            CloseReason::WriteError => "write error",
        };
        f.write_str(name)
    }
}

/// One client socket bound to one room.
pub struct Connection<R, W> {
    id: ConnectionId,
    room_id: RoomId,
    hub: HubHandle,
    reader: R,
    writer: W,
    queue: mpsc::Receiver<EncodedFrame>,
    state: ConnectionState,
}

impl<R, W> Connection<R, W>
where
    R: FrameReader,
    W: FrameWriter + 'static,
{
    /// Register a freshly upgraded socket with the hub.
    ///
    /// The connection is `Active` on return and will receive every broadcast
    /// the hub accepts from now on.
    pub fn open(hub: HubHandle, room_id: impl Into<RoomId>, reader: R, writer: W) -> Self {
        let mut state = ConnectionState::Connecting;
        let (id, room_id, queue) = hub.register(room_id).into_parts();
        transition(&id, &mut state, ConnectionState::Active);

        Self {
            id,
            room_id,
            hub,
            reader,
            writer,
            queue,
            state,
        }
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

    /// Get the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run both pumps until the connection ends.
    ///
    /// The outbound pump runs on its own task; the inbound pump runs on the
    /// caller's. Returns what ended the connection first.
    pub async fn run(self) -> CloseReason {
        let Self {
            id,
            room_id,
            hub,
            mut reader,
            writer,
            queue,
            mut state,
        } = self;

        debug!(connection = %id, room = %room_id, "Connection active");

        let mut outbound = tokio::spawn(write_pump(id.clone(), queue, writer));

        let (reason, outbound_done) = tokio::select! {
            reason = read_pump(&id, &mut reader) => (reason, false),
            result = &mut outbound => (outbound_reason(&id, result), true),
        };

        transition(&id, &mut state, ConnectionState::Closing);
        hub.unregister(&room_id, &id);

        if !outbound_done {
            // Unregistering closes the queue; the pump drains it, sends a
            // close frame and exits.
            let _ = outbound_reason(&id, outbound.await);
        }
        drop(reader);

        transition(&id, &mut state, ConnectionState::Closed);
        debug!(connection = %id, room = %room_id, %reason, "Connection closed");
        reason
    }
}

fn transition(id: &ConnectionId, state: &mut ConnectionState, next: ConnectionState) {
    trace!(connection = %id, from = %state, to = %next, "State change");
    *state = next;
}

fn outbound_reason(id: &ConnectionId, result: Result<CloseReason, JoinError>) -> CloseReason {
    result.unwrap_or_else(|e| {
        warn!(connection = %id, error = %e, "Outbound pump failed");
        CloseReason::WriteError
    })
}

/// Read and discard client frames until the client goes away.
async fn read_pump<R: FrameReader>(id: &ConnectionId, reader: &mut R) -> CloseReason {
    loop {
        match reader.recv().await {
            Ok(Some(inbound)) => {
                trace!(connection = %id, ?inbound, "Discarding inbound frame");
            }
            Ok(None) => {
                debug!(connection = %id, "Peer closed connection");
                return CloseReason::PeerClosed;
            }
            Err(e) => {
                debug!(connection = %id, error = %e, "Read failed");
                return CloseReason::ReadError;
            }
        }
    }
}

/// Drain the outbound queue onto the socket.
async fn write_pump<W: FrameWriter>(
    id: ConnectionId,
    mut queue: mpsc::Receiver<EncodedFrame>,
    mut writer: W,
) -> CloseReason {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = writer.send_text(frame.as_str()).await {
            debug!(connection = %id, error = %e, "Write failed");
            let _ = writer.close().await;
            return CloseReason::WriteError;
        }
    }

    if let Err(e) = writer.close().await {
        trace!(connection = %id, error = %e, "Close frame not sent");
    }
    CloseReason::QueueClosed
}
