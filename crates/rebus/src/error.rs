//! Unified error type for the Rebus server.

use rebus_protocol::ProtocolError;
use rebus_room::RoomError;
use rebus_session::SessionError;
use rebus_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `rebus` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum RebusError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad room code).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (bad token, detached connection).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, wrong state, unauthorized).
    #[error(transparent)]
    Room(#[from] RoomError),
}
