//! # roomcast-transport
//!
//! Connection lifecycle for the Roomcast fan-out layer.
//!
//! A [`Connection`] binds one client socket to one room. It registers with
//! the hub, then runs two pumps until either side gives up:
//!
//! - **inbound** - reads and discards whatever the client sends, watching for
//!   close or read errors
//! - **outbound** - drains the connection's queue onto the socket; it is the
//!   only writer
//!
//! The socket is reached through the [`FrameReader`] and [`FrameWriter`]
//! traits so the lifecycle does not depend on a particular WebSocket stack.
//!
//! ```rust,ignore
//! use roomcast_transport::{websocket, Connection};
//!
//! async fn on_upgrade(socket: axum::extract::ws::WebSocket, hub: HubHandle, room: String) {
//!     let (reader, writer) = websocket::split(socket);
//!     Connection::open(hub, room, reader, writer).run().await;
//! }
//! ```

pub mod connection;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use connection::{CloseReason, Connection, ConnectionState};
pub use roomcast_core::ConnectionId;
pub use traits::{FrameReader, FrameWriter, Inbound, TransportError};
