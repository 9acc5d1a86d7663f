//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The server does not care how messages are represented on the wire; it
//! only needs something that implements [`Codec`]. Text is the unit of
//! exchange because browsers speak WebSocket text frames natively.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to text and decodes text back into values.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a text frame into a value.
    fn decode<T: DeserializeOwned>(
        &self,
        text: &str,
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use clipbridge_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg: ClientMessage = codec
///     .decode(r#"{"type":"clipboard","content":"hi"}"#)
///     .unwrap();
/// assert_eq!(msg, ClientMessage::Clipboard { content: "hi".into() });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        text: &str,
    ) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientMessage, RoomCode, ServerMessage};

    #[test]
    fn test_json_codec_encodes_server_message() {
        let text = JsonCodec
            .encode(&ServerMessage::RoomCreated {
                room_code: RoomCode::normalize("ab3xq9"),
            })
            .unwrap();
        assert_eq!(text, r#"{"type":"room_created","room_code":"AB3XQ9"}"#);
    }

    #[test]
    fn test_json_codec_decode_garbage_fails() {
        let result: Result<ClientMessage, _> = JsonCodec.decode("not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_unknown_type_fails() {
        let result: Result<ClientMessage, _> =
            JsonCodec.decode(r#"{"type":"teleport"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
