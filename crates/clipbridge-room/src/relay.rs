//! Relay service: the only entry point the transport layer calls.
//!
//! # Caller obligations
//!
//! - A connection must [`join_room`](RelayService::join_room) before it may
//!   [`send`](RelayService::send).
//! - [`leave`](RelayService::leave) must run whenever a joined connection
//!   goes away, clean or not. The relay cannot observe sockets, so it
//!   cannot do this on its own; a member that is never removed is only
//!   reclaimed when a broadcast finds its channel closed.

use std::sync::Arc;

use clipbridge_protocol::RoomCode;
use clipbridge_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::sweeper::{SweeperHandle, spawn_sweeper};
use crate::{MemberSender, RelayConfig, RoomError, RoomInfo, RoomRegistry};

/// Owns the room registry and its sweeper for the life of the server.
pub struct RelayService {
    registry: Arc<RoomRegistry>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl RelayService {
    /// Creates the registry and starts its sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: RelayConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new(config));
        let sweeper = spawn_sweeper(
            Arc::clone(&registry),
            registry.config().sweep_interval,
        );
        Self {
            registry,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &RelayConfig {
        self.registry.config()
    }

    /// Creates an empty room and returns its code.
    pub async fn create_room(&self) -> Result<RoomCode, RoomError> {
        self.registry.create_room().await
    }

    /// Attaches a connection to the room named by `code`.
    ///
    /// Never creates a room. `outbound` receives every payload relayed to
    /// this connection; when the room drops it (slow consumer, room closed)
    /// the receiver sees the channel end.
    pub async fn join_room(
        &self,
        code: &str,
        conn_id: ConnectionId,
        outbound: MemberSender,
    ) -> Result<RoomInfo, RoomError> {
        let handle = self.registry.get_room(code).await?;
        match handle.join(conn_id, outbound).await {
            Err(RoomError::NotFound(code)) => {
                // Expired between lookup and join.
                self.registry.discard(&handle).await;
                Err(RoomError::NotFound(code))
            }
            other => other,
        }
    }

    /// Relays `payload` from `sender` to every other member of the room.
    ///
    /// Returns how many members it was queued for. Recipients that cannot
    /// take it are dropped from the room; that never fails the send.
    pub async fn send(
        &self,
        code: &str,
        sender: ConnectionId,
        payload: &str,
    ) -> Result<usize, RoomError> {
        let limit = self.config().max_payload_bytes;
        if payload.len() > limit {
            tracing::debug!(
                %sender,
                size = payload.len(),
                limit,
                "payload rejected"
            );
            return Err(RoomError::PayloadTooLarge {
                size: payload.len(),
                limit,
            });
        }
        let handle = self.registry.lookup(code).await?;
        handle.broadcast(sender, Arc::from(payload)).await
    }

    /// Detaches a connection. Leaving a room twice is not an error.
    pub async fn leave(
        &self,
        code: &str,
        conn_id: ConnectionId,
    ) -> Result<(), RoomError> {
        let handle = self.registry.lookup(code).await?;
        if !handle.leave(conn_id).await? {
            tracing::debug!(room = %handle.code(), %conn_id, "leave from non-member");
        }
        Ok(())
    }

    /// Returns a snapshot of the room.
    pub async fn room_status(&self, code: &str) -> Result<RoomInfo, RoomError> {
        self.registry.get_room(code).await?.info().await
    }

    /// Refreshes the room's activity clock.
    pub async fn touch(&self, code: &str) -> Result<(), RoomError> {
        self.registry.touch(code).await
    }

    /// Closes a room immediately, disconnecting its members.
    pub async fn close_room(&self, code: &str) -> Result<(), RoomError> {
        self.registry.delete_room(code).await
    }

    /// Stops the sweeper and closes every room. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.shutdown().await;
        }
        self.registry.close_all().await;
    }
}
