//! The session manager: session tokens → stable player identities.
//!
//! Three indexes are kept in sync:
//!
//! - `sessions`: `PlayerId → Session` (the record itself)
//! - `tokens`: `SessionToken → PlayerId` (lookup on join)
//! - `connections`: `ConnectionId → PlayerId` (lookup on guess/disconnect)
//!
//! A token maps to at most one player and a player is never created twice
//! for the same token, so rejoining can never duplicate an identity.
//!
//! # Concurrency note
//!
//! `SessionManager` is plain data owned by a single room actor; the actor
//! processes one event at a time, so no locking happens here.

use std::collections::HashMap;

use rand::Rng;
use rebus_protocol::{PlayerId, SessionToken};
use rebus_transport::ConnectionId;
use tokio::time::Instant;

use crate::{Admission, Session, SessionConfig, SessionError, SessionState};

/// Maps session tokens and connections to stable player identities.
///
/// ## Lifecycle
///
/// ```text
/// admit(None) ──→ [Connected] ──disconnect()──→ [Disconnected]
///                      ↑                               │
///                      └──── admit(Some(token)) ───────┘
/// ```
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
    tokens: HashMap<SessionToken, PlayerId>,
    connections: HashMap<ConnectionId, PlayerId>,
    next_player_id: u64,
    config: SessionConfig,
}

impl SessionManager {
    /// Creates a new, empty session manager with the given config.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            connections: HashMap::new(),
            next_player_id: 1,
            config,
        }
    }

    /// Admits a connection, resolving or creating the player behind it.
    ///
    /// - Known token: same `PlayerId`, session re-attached to `connection`.
    ///   If another connection was still attached it is detached and
    ///   reported in [`Admission::displaced`].
    /// - If `connection` already spoke for a different player, that player
    ///   is disconnected and reported in [`Admission::detached`].
    /// - Unknown token: adopted as-is for a new player.
    /// - No token: a random one is generated for a new player.
    ///
    /// # Errors
    /// [`SessionError::InvalidToken`] when an unknown client token is not
    /// acceptable. Known tokens are never rejected.
    pub fn admit(
        &mut self,
        token: Option<SessionToken>,
        connection: ConnectionId,
    ) -> Result<Admission, SessionError> {
        if let Some(player_id) =
            token.as_ref().and_then(|t| self.tokens.get(t)).copied()
        {
            return self.reattach(player_id, connection);
        }

        let token = match token {
            Some(token) => {
                self.validate_client_token(&token)?;
                token
            }
            None => self.generate_unique_token(),
        };

        // A connection speaks for one player per room.
        let detached = self.detach_other(connection, None);

        let player_id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        self.tokens.insert(token.clone(), player_id);
        self.connections.insert(connection, player_id);
        self.sessions.insert(
            player_id,
            Session {
                player_id,
                token: token.clone(),
                state: SessionState::Connected { connection },
            },
        );

        tracing::info!(%player_id, %connection, "session created");
        Ok(Admission {
            player_id,
            token,
            reconnected: false,
            displaced: None,
            detached,
        })
    }

    fn reattach(
        &mut self,
        player_id: PlayerId,
        connection: ConnectionId,
    ) -> Result<Admission, SessionError> {
        let detached = self.detach_other(connection, Some(player_id));

        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;

        let displaced = session.connection().filter(|old| *old != connection);
        if let Some(old) = displaced {
            self.connections.remove(&old);
        }
        session.state = SessionState::Connected { connection };
        let token = session.token.clone();
        self.connections.insert(connection, player_id);

        tracing::info!(%player_id, %connection, ?displaced, "session resumed");
        Ok(Admission {
            player_id,
            token,
            reconnected: true,
            displaced,
            detached,
        })
    }

    /// Unbinds `connection` from whoever it spoke for, unless that is
    /// `keep`, and returns the player left disconnected.
    fn detach_other(
        &mut self,
        connection: ConnectionId,
        keep: Option<PlayerId>,
    ) -> Option<PlayerId> {
        let previous = self.connections.remove(&connection)?;
        if Some(previous) == keep {
            return None;
        }
        self.mark_disconnected(previous);
        tracing::info!(player_id = %previous, %connection, "session detached by rejoin");
        Some(previous)
    }

    /// Detaches a connection. The session and its token survive so the
    /// player can come back.
    ///
    /// # Errors
    /// [`SessionError::NotAttached`] if the connection does not currently
    /// speak for anyone (never joined, or was displaced).
    pub fn disconnect(
        &mut self,
        connection: ConnectionId,
    ) -> Result<PlayerId, SessionError> {
        let player_id = self
            .connections
            .remove(&connection)
            .ok_or(SessionError::NotAttached(connection))?;
        self.mark_disconnected(player_id);
        tracing::info!(%player_id, %connection, "session detached");
        Ok(player_id)
    }

    fn mark_disconnected(&mut self, player_id: PlayerId) {
        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.state = SessionState::Disconnected {
                since: Instant::now(),
            };
        }
    }

    /// The player a connection currently speaks for.
    pub fn player_for(&self, connection: ConnectionId) -> Option<PlayerId> {
        self.connections.get(&connection).copied()
    }

    /// The connection currently attached to a player.
    pub fn connection_of(&self, player_id: PlayerId) -> Option<ConnectionId> {
        self.sessions.get(&player_id).and_then(Session::connection)
    }

    /// Resolves a token without admitting anyone.
    pub fn lookup(&self, token: &SessionToken) -> Option<PlayerId> {
        self.tokens.get(token).copied()
    }

    /// Looks up a session by player ID.
    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Number of sessions with a live connection.
    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of sessions ever created in this room.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn validate_client_token(&self, token: &SessionToken) -> Result<(), SessionError> {
        let raw = token.as_str();
        if raw.is_empty() {
            return Err(SessionError::InvalidToken("empty".into()));
        }
        if raw.len() > self.config.max_client_token_len {
            return Err(SessionError::InvalidToken(format!(
                "longer than {} bytes",
                self.config.max_client_token_len
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SessionError::InvalidToken(
                "contains whitespace or control characters".into(),
            ));
        }
        Ok(())
    }

    fn generate_unique_token(&self) -> SessionToken {
        loop {
            let token = generate_token(self.config.token_bytes);
            if !self.tokens.contains_key(&token) {
                return token;
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// Random lowercase hex string of `bytes * 2` characters.
fn generate_token(bytes: usize) -> SessionToken {
    let mut rng = rand::rng();
    let hex: String = (0..bytes)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect();
    SessionToken::new(hex)
}
