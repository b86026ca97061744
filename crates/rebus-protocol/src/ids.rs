//! Identity newtypes.
//!
//! Three different identities meet in a room and must never be confused:
//!
//! - [`RoomCode`] — what players type to find a room.
//! - [`SessionToken`] — a secret the client keeps across reconnects.
//! - [`PlayerId`] — the stable identity the server derives from the token.
//!
//! The fourth, the transport identity, lives in `rebus-transport` because
//! it only exists while a socket is open.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// PlayerId
// ---------------------------------------------------------------------------

/// Stable identifier of a player within a room.
///
/// Assigned once at first join and preserved across every reconnect made
/// with the same session token. Serialized as a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Room code alphabet. `0/O` and `1/I` are left out so codes read aloud or
/// copied off a projector screen are never ambiguous.
pub const ROOM_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// The short code identifying a live room.
///
/// Parsing upper-cases the input first, so `"abc234"` and `"ABC234"` name
/// the same room. On the wire the code is a plain string and is validated
/// during deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Validates and normalizes a room code.
    pub fn parse(value: &str) -> Result<Self, ProtocolError> {
        let code = value.trim().to_ascii_uppercase();
        if code.chars().count() != ROOM_CODE_LEN {
            return Err(ProtocolError::InvalidRoomCode(format!(
                "expected {ROOM_CODE_LEN} characters, got {:?}",
                value
            )));
        }
        if let Some(ch) = code.chars().find(|c| !ROOM_CODE_ALPHABET.contains(*c)) {
            return Err(ProtocolError::InvalidRoomCode(format!(
                "character {ch:?} is not allowed"
            )));
        }
        Ok(Self(code))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// SessionToken
// ---------------------------------------------------------------------------

/// Durable client-held secret that maps back to a [`PlayerId`].
///
/// Distinct from the transport identity: a token outlives any number of
/// sockets. `Display` only shows a prefix so tokens never end up whole in
/// logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the full token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({self})")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "{prefix}…")
    }
}
