//! Codec trait and implementations for turning messages into frames.
//!
//! The hub and connection handler only ever see typed messages; the codec
//! is the single place that knows the byte format. Swapping formats means
//! writing another [`Codec`], nothing else.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes typed messages to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` for malformed or mismatched input
    /// and `ProtocolError::InvalidMessage` for an empty frame.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] producing JSON text frames, which is what browser clients
/// read with `JSON.parse`.
///
/// ## Example
///
/// ```rust
/// use fourline_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg: ClientMessage = codec
///     .decode(br#"{"type":"move","column":3}"#)
///     .unwrap();
/// assert_eq!(msg, ClientMessage::Move { column: 3 });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::InvalidMessage("empty frame".into()));
        }
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
