//! Room registry: creates, looks up, and evicts rooms.

use std::collections::HashMap;

use clipbridge_protocol::RoomCode;
use tokio::sync::RwLock;

use crate::room::{RoomSettings, spawn_room};
use crate::{CodeGenerator, RelayConfig, RoomError, RoomHandle};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Rooms evicted because they were empty and idle past the TTL.
    pub evicted: Vec<RoomCode>,
    /// Rooms still live after the pass.
    pub retained: usize,
    /// Rooms whose actor had already stopped; they were discarded.
    pub failed: usize,
}

/// Process-wide map from room code to running room actor.
///
/// The map lock is only held for map operations, never across a round
/// trip to a room actor; per-room state is serialized by the actor itself.
/// Share it behind an `Arc`.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomCode, RoomHandle>>,
    codes: CodeGenerator,
    config: RelayConfig,
}

impl RoomRegistry {
    /// Creates an empty registry. The config is validated first.
    pub fn new(config: RelayConfig) -> Self {
        let config = config.validated();
        Self {
            rooms: RwLock::new(HashMap::new()),
            codes: CodeGenerator::new(&config),
            config,
        }
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Creates an empty room under a fresh code and returns the code.
    pub async fn create_room(&self) -> Result<RoomCode, RoomError> {
        let mut rooms = self.rooms.write().await;
        let code = self.codes.generate(|code| rooms.contains_key(code))?;
        let handle = spawn_room(
            code.clone(),
            RoomSettings::from(&self.config),
            self.config.command_channel_size,
        );
        rooms.insert(code.clone(), handle);
        tracing::info!(room = %code, rooms = rooms.len(), "room created");
        Ok(code)
    }

    /// Returns the handle for `code` without asking the actor anything.
    ///
    /// Case-insensitive. Fails if the code is unknown or its actor has
    /// already stopped.
    pub async fn lookup(&self, code: &str) -> Result<RoomHandle, RoomError> {
        let code = RoomCode::normalize(code);
        let handle = self
            .rooms
            .read()
            .await
            .get(&code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        if handle.is_closed() {
            self.discard(&handle).await;
            return Err(RoomError::NotFound(code));
        }
        Ok(handle)
    }

    /// Looks up a live room. Rooms that are empty and idle past the TTL
    /// count as absent even if the sweeper has not evicted them yet.
    pub async fn get_room(&self, code: &str) -> Result<RoomHandle, RoomError> {
        let handle = self.lookup(code).await?;
        let info = match handle.info().await {
            Ok(info) => info,
            Err(e) => {
                self.discard(&handle).await;
                return Err(e);
            }
        };
        if info.expired {
            return Err(RoomError::NotFound(info.code));
        }
        Ok(handle)
    }

    /// Refreshes a live room's activity clock.
    pub async fn touch(&self, code: &str) -> Result<(), RoomError> {
        self.get_room(code).await?.touch().await
    }

    /// Removes a room and shuts its actor down, disconnecting any members.
    pub async fn delete_room(&self, code: &str) -> Result<(), RoomError> {
        let code = RoomCode::normalize(code);
        let handle = self
            .rooms
            .write()
            .await
            .remove(&code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        // An already-stopped actor has nothing left to close.
        let _ = handle.shutdown().await;
        tracing::info!(room = %code, "room deleted");
        Ok(())
    }

    /// Drops the map entry for `handle` if it still points at that actor.
    pub(crate) async fn discard(&self, handle: &RoomHandle) {
        let mut rooms = self.rooms.write().await;
        if rooms
            .get(handle.code())
            .is_some_and(|current| current.same_room(handle))
        {
            rooms.remove(handle.code());
            tracing::debug!(room = %handle.code(), "stale room discarded");
        }
    }

    /// Runs one eviction pass over every room.
    ///
    /// Each room decides inside its own actor whether it is empty and idle,
    /// so a join racing the sweep is either seen (room kept) or rejected
    /// (room gone). A room that fails to answer is logged and discarded
    /// without affecting the rest of the pass.
    pub async fn sweep(&self) -> SweepReport {
        let snapshot: Vec<RoomHandle> =
            self.rooms.read().await.values().cloned().collect();
        let mut report = SweepReport::default();

        for handle in snapshot {
            match handle.try_expire().await {
                Ok(true) => {
                    self.discard(&handle).await;
                    report.evicted.push(handle.code().clone());
                }
                Ok(false) => report.retained += 1,
                Err(e) => {
                    tracing::warn!(
                        room = %handle.code(),
                        error = %e,
                        "room did not answer sweep, discarding"
                    );
                    self.discard(&handle).await;
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Shuts down every room. Used on process shutdown.
    pub async fn close_all(&self) {
        let rooms: Vec<RoomHandle> =
            self.rooms.write().await.drain().map(|(_, h)| h).collect();
        for handle in &rooms {
            let _ = handle.shutdown().await;
        }
        tracing::info!(rooms = rooms.len(), "all rooms closed");
    }

    /// Returns the number of rooms in the map.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Returns `true` if there are no rooms.
    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// Lists all room codes.
    pub async fn codes(&self) -> Vec<RoomCode> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clipbridge_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;

    fn registry(ttl: Duration) -> RoomRegistry {
        RoomRegistry::new(RelayConfig {
            room_ttl: ttl,
            ..RelayConfig::default()
        })
    }

    #[tokio::test]
    async fn test_create_room_returns_unique_codes() {
        let reg = RoomRegistry::default();
        let a = reg.create_room().await.unwrap();
        let b = reg.create_room().await.unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.len().await, 2);
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let reg = RoomRegistry::default();
        let code = reg.create_room().await.unwrap();
        let lower = code.as_str().to_ascii_lowercase();
        let handle = reg.get_room(&lower).await.unwrap();
        assert_eq!(handle.code(), &code);
    }

    #[tokio::test]
    async fn test_get_unknown_room_is_not_found() {
        let reg = RoomRegistry::default();
        let err = reg.get_room("ZZZZZZ").await.unwrap_err();
        assert!(matches!(err, RoomError::NotFound(c) if c.as_str() == "ZZZZZZ"));
    }

    #[tokio::test]
    async fn test_delete_room_removes_and_disconnects() {
        let reg = RoomRegistry::default();
        let code = reg.create_room().await.unwrap();
        let handle = reg.get_room(code.as_str()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        handle.join(ConnectionId::new(1), tx).await.unwrap();

        reg.delete_room(code.as_str()).await.unwrap();
        assert!(reg.is_empty().await);
        assert!(rx.recv().await.is_none());
        assert!(matches!(
            reg.delete_room(code.as_str()).await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_room_hides_expired_but_unswept_room() {
        let reg = registry(Duration::from_secs(60));
        let code = reg.create_room().await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(
            reg.get_room(code.as_str()).await,
            Err(RoomError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_keeps_room_alive() {
        let reg = registry(Duration::from_secs(60));
        let code = reg.create_room().await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        reg.touch(code.as_str()).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;

        let report = reg.sweep().await;
        assert!(report.evicted.is_empty());
        assert_eq!(report.retained, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_empty_rooms_only() {
        let reg = registry(Duration::from_secs(60));
        let idle = reg.create_room().await.unwrap();
        let busy = reg.create_room().await.unwrap();
        let (tx, _rx) = mpsc::channel(4);
        reg.get_room(busy.as_str())
            .await
            .unwrap()
            .join(ConnectionId::new(7), tx)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(3_600)).await;
        let report = reg.sweep().await;

        assert_eq!(report.evicted, vec![idle.clone()]);
        assert_eq!(report.retained, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(reg.codes().await, vec![busy]);
    }

    #[tokio::test]
    async fn test_sweep_discards_dead_actor_and_continues() {
        let reg = RoomRegistry::default();
        let dead = reg.create_room().await.unwrap();
        let _alive = reg.create_room().await.unwrap();

        // Stop the actor behind the registry's back.
        let handle = reg.lookup(dead.as_str()).await.unwrap();
        handle.shutdown().await.unwrap();
        while !handle.is_closed() {
            tokio::task::yield_now().await;
        }

        let report = reg.sweep().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_close_all_empties_registry() {
        let reg = RoomRegistry::default();
        reg.create_room().await.unwrap();
        reg.create_room().await.unwrap();
        reg.close_all().await;
        assert!(reg.is_empty().await);
    }
}
