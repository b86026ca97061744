//! Codec trait and implementations for serializing/deserializing messages.
//!
//! Handlers only ever see [`ClientCommand`](crate::ClientCommand) and
//! [`ServerEvent`](crate::ServerEvent); how those become bytes is the
//! codec's business, so a binary codec can be swapped in later without
//! touching the room layer.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use rebus_protocol::{ClientCommand, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let cmd: ClientCommand = codec.decode(br#"{"type":"ping"}"#).unwrap();
/// assert_eq!(cmd, ClientCommand::Ping);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
