//! Error types for the room layer.

use rebus_protocol::{RoomCode, ServerEvent};

/// Errors that can occur during room operations.
///
/// Not every error is worth telling the client about. Host commands from
/// the wrong connection and repeat guesses are dropped without a reply;
/// see [`RoomError::is_surfaced`].
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No live room has this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room is in a state that doesn't allow this operation.
    /// For example, joining a room whose puzzles are still being loaded.
    #[error("{0}")]
    InvalidState(String),

    /// A host-only command from a connection that is not the host.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// A second scoring guess in the same round.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Malformed input such as an empty name or an empty puzzle list.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The room's actor has stopped or its channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// `true` if the client that caused this error should be told.
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, Self::Unauthorized(_) | Self::Duplicate(_))
    }

    /// The notification to send back, if this error is surfaced.
    ///
    /// A stopped actor is reported the same way as a missing room; from
    /// the client's side there is no difference.
    pub fn to_event(&self) -> Option<ServerEvent> {
        match self {
            Self::Unavailable(code) => {
                Some(ServerEvent::error(Self::NotFound(code.clone()).to_string()))
            }
            err if err.is_surfaced() => Some(ServerEvent::error(err.to_string())),
            _ => None,
        }
    }
}
