//! Error types for the room layer.

use clipbridge_protocol::RoomCode;
use clipbridge_transport::ConnectionId;

/// Errors that can occur during room operations.
///
/// Every variant is scoped to a single room or connection; none of them is
/// fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No live room has this code. Covers never-created, expired, and
    /// closed rooms alike.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The payload is larger than the configured cap and was not relayed.
    #[error("payload of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Code generation ran out of retries. Only reachable when the live
    /// room count approaches the size of the code space.
    #[error("no free room code after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The room reached its configured member cap.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The connection is already a member of this room.
    #[error("{0} already joined room {1}")]
    AlreadyJoined(ConnectionId, RoomCode),

    /// The connection tried to send into a room it has not joined.
    #[error("{0} is not a member of room {1}")]
    NotMember(ConnectionId, RoomCode),
}
