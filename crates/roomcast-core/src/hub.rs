//! Broadcast hub for Roomcast.
//!
//! The hub is a single control loop that owns room membership. Connections
//! and the CRUD layer never touch the membership map; they send requests
//! through a [`HubHandle`] and the loop applies them one at a time. The same
//! loop is the only code that closes a connection's outbound queue, so a
//! queue is closed exactly once no matter how many teardown paths race.
//!
//! Member counts are the one thing read from outside the loop. They go
//! through the map's shard locks, which exclude the loop's structural writes
//! but not payload delivery.

use crate::room::{Room, RoomId};
use crate::subscription::{ConnectionId, Subscription};
use dashmap::DashMap;
use roomcast_protocol::{codec, EncodedFrame, ProtocolError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The broadcast payload could not be encoded. Nothing was sent.
    #[error("Failed to encode broadcast: {0}")]
    Encode(#[from] ProtocolError),
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// Requests processed by the control loop.
enum Command {
    Register {
        room_id: RoomId,
        connection_id: ConnectionId,
        sender: mpsc::Sender<EncodedFrame>,
    },
    Unregister {
        room_id: RoomId,
        connection_id: ConnectionId,
    },
    Broadcast {
        room_id: RoomId,
        frame: EncodedFrame,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Running totals kept by the control loop.
#[derive(Debug, Default)]
struct Counters {
    pending: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    evictions: AtomicU64,
}

type Rooms = Arc<DashMap<RoomId, Room>>;

/// The control loop that owns room membership.
///
/// Create one with [`Hub::spawn`] (or [`Hub::new`] plus [`Hub::run`] when the
/// caller wants to drive the future itself) and hand clones of the returned
/// [`HubHandle`] to whoever needs to register or broadcast.
pub struct Hub {
    /// Room membership, indexed by room ID.
    rooms: Rooms,
    /// Running totals.
    counters: Arc<Counters>,
    /// Request inbox.
    inbox: mpsc::UnboundedReceiver<Command>,
}

impl Hub {
    /// Create a hub and the handle that talks to it.
    ///
    /// Nothing is processed until [`Hub::run`] is polled.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        info!("Creating hub with config: {:?}", config);

        let (commands, inbox) = mpsc::unbounded_channel();
        let rooms: Rooms = Arc::new(DashMap::new());
        let counters = Arc::new(Counters::default());

        let hub = Self {
            rooms: Arc::clone(&rooms),
            counters: Arc::clone(&counters),
            inbox,
        };
        let handle = HubHandle {
            commands,
            rooms,
            counters,
            config,
        };

        (hub, handle)
    }

    /// Create a hub and run its control loop on a new task.
    #[must_use]
    pub fn spawn(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(config);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// Run the control loop.
    ///
    /// Returns after a shutdown request, or once every handle is dropped.
    /// Either way every remaining queue is closed on the way out.
    pub async fn run(mut self) {
        info!("Hub control loop started");

        while let Some(command) = self.inbox.recv().await {
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
            match command {
                Command::Register {
                    room_id,
                    connection_id,
                    sender,
                } => self.register(room_id, connection_id, sender),
                Command::Unregister {
                    room_id,
                    connection_id,
                } => self.unregister(&room_id, &connection_id),
                Command::Broadcast { room_id, frame } => self.broadcast(&room_id, &frame),
                Command::Flush(done) => {
                    let _ = done.send(());
                }
                Command::Shutdown => {
                    info!("Hub shutdown requested");
                    break;
                }
            }
        }

        self.close_all();
        info!("Hub control loop stopped");
    }

    fn register(
        &self,
        room_id: RoomId,
        connection_id: ConnectionId,
        sender: mpsc::Sender<EncodedFrame>,
    ) {
        let mut room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            debug!(room = %room_id, "Creating room");
            Room::new(room_id.clone())
        });
        room.insert(connection_id.clone(), sender);

        debug!(
            room = %room_id,
            connection = %connection_id,
            members = room.len(),
            "Registered"
        );
    }

    fn unregister(&self, room_id: &str, connection_id: &ConnectionId) {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut room) => room.remove(connection_id),
            None => false,
        };

        if !removed {
            trace!(room = %room_id, connection = %connection_id, "Already unregistered");
            return;
        }

        debug!(room = %room_id, connection = %connection_id, "Unregistered");
        self.delete_if_empty(room_id);
    }

    fn broadcast(&self, room_id: &str, frame: &EncodedFrame) {
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);

        let delivery = match self.rooms.get(room_id) {
            Some(room) => room.deliver(frame),
            None => {
                trace!(room = %room_id, "Broadcast to room without members");
                return;
            }
        };

        self.counters
            .deliveries
            .fetch_add(delivery.delivered as u64, Ordering::Relaxed);

        if delivery.has_failures() {
            if let Some(mut room) = self.rooms.get_mut(room_id) {
                for connection_id in &delivery.full {
                    if room.remove(connection_id) {
                        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            room = %room_id,
                            connection = %connection_id,
                            "Evicted slow subscriber"
                        );
                    }
                }
                for connection_id in &delivery.closed {
                    room.remove(connection_id);
                }
            }
            self.delete_if_empty(room_id);
        }

        trace!(
            room = %room_id,
            recipients = delivery.delivered,
            bytes = frame.len(),
            "Broadcast"
        );
    }

    fn delete_if_empty(&self, room_id: &str) {
        if self
            .rooms
            .remove_if(room_id, |_, room| room.is_empty())
            .is_some()
        {
            debug!(room = %room_id, "Deleted empty room");
        }
    }

    fn close_all(&mut self) {
        // Stop taking requests first so nothing registers behind our back.
        self.inbox.close();

        let connections: usize = self.rooms.iter().map(|room| room.len()).sum();
        self.rooms.clear();

        if connections > 0 {
            info!(connections, "Closed remaining connection queues");
        }
    }
}

/// Point-in-time hub statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Number of rooms with at least one member.
    pub room_count: usize,
    /// Number of registered connections across all rooms.
    pub connection_count: usize,
    /// Broadcasts processed since start.
    pub broadcasts: u64,
    /// Frames enqueued since start.
    pub deliveries: u64,
    /// Connections evicted for a full outbound queue since start.
    pub evictions: u64,
    /// Requests sent to the control loop but not yet processed.
    pub pending: u64,
}

/// Cloneable entry point to a running [`Hub`].
///
/// Every mutating call is fire-and-forget: it queues a request for the
/// control loop and returns immediately.
///
/// The request inbox is unbounded, so a caller never blocks and a
/// registration is never dropped. The cost is that a producer broadcasting
/// faster than the loop can deliver grows the inbox without limit.
/// [`HubStats::pending`] reports that backlog.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
    rooms: Rooms,
    counters: Arc<Counters>,
    config: HubConfig,
}

impl HubHandle {
    /// Register a new connection in a room.
    ///
    /// The returned subscription carries the connection's outbound queue.
    /// The connection receives broadcasts accepted by the hub after this
    /// registration.
    pub fn register(&self, room_id: impl Into<RoomId>) -> Subscription {
        let room_id = room_id.into();
        let connection_id = ConnectionId::generate();
        let (sender, queue) = mpsc::channel(self.config.queue_capacity.max(1));

        self.send(Command::Register {
            room_id: room_id.clone(),
            connection_id: connection_id.clone(),
            sender,
        });

        Subscription::new(connection_id, room_id, queue)
    }

    /// Unregister a connection, closing its outbound queue.
    ///
    /// Unregistering a connection that is already gone is a no-op.
    pub fn unregister(&self, room_id: &str, connection_id: &ConnectionId) {
        self.send(Command::Unregister {
            room_id: room_id.to_string(),
            connection_id: connection_id.clone(),
        });
    }

    /// Broadcast a payload to every connection in a room.
    ///
    /// The payload is encoded here, once, before anything is queued.
    /// Delivery is best-effort: a room without members is not an error, and
    /// members too slow to take the frame are evicted silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded. No member receives
    /// anything in that case.
    pub fn broadcast_to_room<T: Serialize + ?Sized>(
        &self,
        room_id: &str,
        payload: &T,
    ) -> Result<(), HubError> {
        let frame = codec::encode(payload)?;
        self.broadcast_frame(room_id, frame);
        Ok(())
    }

    /// Broadcast an already encoded frame to every connection in a room.
    pub fn broadcast_frame(&self, room_id: &str, frame: EncodedFrame) {
        self.send(Command::Broadcast {
            room_id: room_id.to_string(),
            frame,
        });
    }

    /// Get the number of connections registered in a room.
    #[must_use]
    pub fn connection_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|room| room.len()).unwrap_or(0)
    }

    /// Check if a room currently has members.
    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Get all room IDs that currently have members.
    #[must_use]
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            room_count: self.rooms.len(),
            connection_count: self.rooms.iter().map(|room| room.len()).sum(),
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            pending: self.counters.pending.load(Ordering::Relaxed),
        }
    }

    /// Wait until every request sent before this call has been processed.
    ///
    /// Returns immediately if the hub has stopped.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.send(Command::Flush(done));
        let _ = wait.await;
    }

    /// Ask the control loop to close every queue and stop.
    ///
    /// Requests sent afterwards are dropped; a registration made after
    /// shutdown gets a queue that is already closed.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Check if the control loop is still accepting requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, command: Command) {
        // Counted before sending so the loop never decrements first.
        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        if self.commands.send(command).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
            debug!("Hub stopped, request dropped");
        }
    }
}
