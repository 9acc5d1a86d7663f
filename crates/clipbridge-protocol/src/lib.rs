//! Wire protocol for Clipbridge.
//!
//! - **Types** ([`RoomCode`], [`ClientMessage`], [`ServerMessage`]): the
//!   messages exchanged with devices over a text connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from text.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections or rooms; it only
//! serializes and deserializes.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ClientMessage, RoomCode, ServerMessage};
