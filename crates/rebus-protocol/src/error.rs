//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or validating wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown `type` tag, missing
    /// fields, or a field that failed its own validation (room codes).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room code that is the wrong length or uses characters outside
    /// the unambiguous alphabet.
    #[error("invalid room code: {0}")]
    InvalidRoomCode(String),
}
