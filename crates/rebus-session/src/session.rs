//! Session types: the server's record of one player's identity and which
//! socket, if any, currently speaks for them.

use rebus_protocol::{PlayerId, SessionToken};
use rebus_transport::ConnectionId;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Random bytes in a server-generated token. Rendered as hex, so the
    /// token is twice this many characters.
    pub token_bytes: usize,

    /// Longest client-supplied token that will be adopted.
    pub max_client_token_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_bytes: 16,
            max_client_token_len: 128,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Whether a session currently has a live transport identity.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected
///       ↑                            │
///       └──────(admit with token)────┘
/// ```
///
/// There is no expired state: a session lives exactly as long as its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected { connection: ConnectionId },
    Disconnected { since: Instant },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single player's session within a room.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,
    pub token: SessionToken,
    pub state: SessionState,
}

impl Session {
    /// The connection currently attached, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self.state {
            SessionState::Connected { connection } => Some(connection),
            SessionState::Disconnected { .. } => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Outcome of [`SessionManager::admit`](crate::SessionManager::admit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub player_id: PlayerId,
    /// The token the client must keep. Echoes the presented token, or a
    /// freshly generated one when none was presented.
    pub token: SessionToken,
    /// `true` when the token was already known.
    pub reconnected: bool,
    /// A still-attached connection that this admission took over. It no
    /// longer speaks for the player.
    pub displaced: Option<ConnectionId>,
    /// A different player this connection spoke for until now. That player
    /// is left disconnected.
    pub detached: Option<PlayerId>,
}
