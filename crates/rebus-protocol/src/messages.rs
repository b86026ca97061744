//! Commands accepted from clients and events pushed to them.
//!
//! Both enums are internally tagged with a snake_case `type` field, which
//! is what the browser client switches on:
//!
//! ```json
//! { "type": "submit_guess", "room_code": "K7QX2M", "guess": "eifel tower" }
//! { "type": "hint", "level": 1, "text": "E_____ T____ (2 words)" }
//! ```

use serde::{Deserialize, Serialize};

use crate::{PlayerId, RoomCode, SessionToken};

// ---------------------------------------------------------------------------
// Shared value types
// ---------------------------------------------------------------------------

/// Coarse lifecycle state of a room as reported to clients and to the
/// status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    Setup,
    Lobby,
    Playing,
    Finished,
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Lobby => "lobby",
            Self::Playing => "playing",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// How a guess compared to the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Correct,
    Partial,
    Wrong,
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub score: u32,
    pub online: bool,
    pub guessed_this_round: bool,
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Everything a client may ask the server to do.
///
/// `start_game` and `next_round` act on the room the connection last
/// joined as host; they carry no room code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Attach this connection to a room as its host display.
    HostJoin {
        room_code: RoomCode,
        #[serde(default)]
        host_key: Option<String>,
    },

    /// Join (or rejoin) a room as a player.
    JoinRoom {
        room_code: RoomCode,
        name: String,
        #[serde(default)]
        session_token: Option<SessionToken>,
    },

    /// Host only: leave the lobby and begin round 0.
    StartGame {
        rounds: usize,
        seconds_per_round: u32,
    },

    /// Submit a guess for the current round.
    SubmitGuess { room_code: RoomCode, guess: String },

    /// Host only: end the current round (if running) and advance now.
    NextRound,

    /// Keep-alive; answered with [`ServerEvent::Pong`].
    Ping,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Everything the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to `join_room`. The client must store `session_token` and
    /// present it on every later join to keep its identity and score.
    Joined {
        room_code: RoomCode,
        player_id: PlayerId,
        session_token: SessionToken,
        name: String,
        score: u32,
        state: RoomPhase,
        reconnected: bool,
    },

    /// Reply to `host_join`.
    HostJoined {
        room_code: RoomCode,
        state: RoomPhase,
        puzzle_count: usize,
        leaderboard: Vec<LeaderboardEntry>,
    },

    PlayerJoined {
        player_id: PlayerId,
        name: String,
        reconnected: bool,
    },

    PlayerLeft { player_id: PlayerId, name: String },

    /// Players ranked by descending score.
    Leaderboard { players: Vec<LeaderboardEntry> },

    /// A round began. `round` is 1-based. `remaining` is only set when the
    /// event is replayed to someone joining mid-round.
    NewRound {
        round: usize,
        total_rounds: usize,
        image: String,
        time_per_round: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remaining: Option<u32>,
    },

    Hint { level: u8, text: String },

    /// Private reply to the guesser.
    GuessResult {
        outcome: MatchKind,
        similarity: f64,
        points: u32,
        score: u32,
    },

    /// Broadcast that someone scored, without revealing what they typed.
    PlayerGuessed { player_id: PlayerId, name: String },

    RoundEnd {
        answer: String,
        leaderboard: Vec<LeaderboardEntry>,
        is_last_round: bool,
    },

    GameOver { leaderboard: Vec<LeaderboardEntry> },

    /// Sent to the connection that just became host.
    HostPromoted,

    /// The player already scored this round; the client should not prompt
    /// for another guess.
    AlreadyAnswered,

    Error { message: String },

    Pong,
}

impl ServerEvent {
    /// Builds the uniform error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
