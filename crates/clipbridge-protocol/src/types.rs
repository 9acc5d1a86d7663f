//! Protocol types: room codes and the messages exchanged with devices.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// A short, human-typed room identifier such as `AB3XQ9`.
///
/// Codes are stored in canonical (uppercase, trimmed) form so that lookups
/// are case-insensitive: `ab3xq9`, ` AB3xq9 ` and `AB3XQ9` all name the same
/// room.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Canonicalizes user input into a `RoomCode`.
    ///
    /// This does not validate length or alphabet; an ill-formed code simply
    /// never matches a live room.
    pub fn normalize(input: &str) -> Self {
        Self(input.trim().to_ascii_uppercase())
    }

    /// Returns the canonical code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// Messages a device sends to the server.
///
/// Internally tagged and snake_case on the wire, e.g.
/// `{"type":"clipboard","content":"hello"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server for a fresh room code.
    CreateRoom,

    /// Attach this connection to a room. The code is raw user input.
    JoinRoom { room_code: String },

    /// New clipboard content to relay to every other device in the room.
    Clipboard { content: String },

    /// Detach from the current room without closing the connection.
    LeaveRoom,

    /// Ask for the current room's status.
    Status,

    /// Keep-alive. `client_time` is echoed back for RTT measurement.
    Heartbeat { client_time: u64 },
}

impl ClientMessage {
    /// Checks rules the JSON shape alone cannot express.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::JoinRoom { room_code } if room_code.trim().is_empty() => Err(
                ProtocolError::InvalidMessage("room_code must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Messages the server sends to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A room was created; share this code with the other devices.
    RoomCreated { room_code: RoomCode },

    /// This connection joined `room_code`; `devices` counts every member,
    /// including this one.
    Joined { room_code: RoomCode, devices: usize },

    /// Clipboard content relayed from another device, or the room's last
    /// content replayed right after joining.
    Sync { content: String },

    /// Reply to [`ClientMessage::Status`].
    Status {
        room_code: RoomCode,
        devices_connected: usize,
        last_content_length: usize,
        /// Whole seconds since the room's last activity.
        idle_secs: u64,
    },

    /// Reply to [`ClientMessage::Heartbeat`]. `server_time` is milliseconds
    /// since the connection was accepted.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A request failed. `code` follows HTTP status semantics
    /// (400, 404, 409, 413, 500).
    Error { code: u16, message: String },
}
