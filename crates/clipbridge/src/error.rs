//! Unified error type for Clipbridge.

use clipbridge_protocol::ProtocolError;
use clipbridge_room::RoomError;
use clipbridge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClipbridgeError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, too large, exhausted).
    #[error(transparent)]
    Room(#[from] RoomError),
}
