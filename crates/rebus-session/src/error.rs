//! Error types for the session layer.

use rebus_protocol::PlayerId;
use rebus_transport::ConnectionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A client-supplied token that cannot be adopted (empty, too long,
    /// or containing whitespace/control characters).
    #[error("invalid session token: {0}")]
    InvalidToken(String),

    /// The connection is not attached to any session, either because it
    /// never joined or because a newer connection took the session over.
    #[error("connection {0} has no session")]
    NotAttached(ConnectionId),

    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),
}
