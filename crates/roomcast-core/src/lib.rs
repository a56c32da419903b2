//! # roomcast-core
//!
//! Room registry and broadcast hub for the Roomcast fan-out layer.
//!
//! - **Hub** - single control loop that owns room membership and dispatches broadcasts
//! - **HubHandle** - cloneable entry point used by connections and the CRUD layer
//! - **Room** - the membership set of one room
//! - **Subscription** - what a connection holds after registering: its id and outbound queue
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  register/unregister  ┌─────────────┐       ┌─────────────┐
//! │ Connection  │──────────────────────▶│             │──────▶│    Room     │
//! └─────────────┘                       │  Hub loop   │       └─────────────┘
//! ┌─────────────┐  broadcast_to_room    │             │              │ try_send
//! │  CRUD layer │──────────────────────▶│             │              ▼
//! └─────────────┘                       └─────────────┘       outbound queues
//! ```
//!
//! Only the hub loop mutates membership or closes a queue. Everything else
//! talks to it through a [`HubHandle`].

pub mod hub;
pub mod room;
pub mod subscription;

pub use hub::{Hub, HubConfig, HubError, HubHandle, HubStats};
pub use room::{validate_room_id, Room, RoomId};
pub use subscription::{ConnectionId, Subscription};
