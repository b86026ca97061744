//! Room lifecycle state machine.

use std::fmt;

use rebus_protocol::RoomPhase;

use crate::RoomError;

/// Where the current round stands while a game is being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// Guesses are accepted.
    Active,
    /// The answer has been revealed; waiting to advance.
    Intermission,
}

/// The lifecycle state of a room.
///
/// ```text
/// Setup ──PuzzlesLoaded──→ Lobby ──Start──→ Playing { 0, Active }
///
/// Playing { r, Active } ──EndRound──→ Playing { r, Intermission }
/// Playing { r, Intermission } ──Advance──→ Playing { r + 1, Active }
///                                      └─→ Finished   (r was the last)
/// ```
///
/// - **Setup**: created, waiting for its puzzles. Joins are refused.
/// - **Lobby**: puzzles loaded; players gather until the host starts.
/// - **Playing**: `round` is the 0-based index of the current puzzle.
/// - **Finished**: the last round has ended. Final leaderboard only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Setup,
    Lobby,
    Playing { round: usize, phase: RoundPhase },
    Finished,
}

/// Inputs that move a room between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    PuzzlesLoaded,
    Start,
    EndRound,
    Advance { total_rounds: usize },
}

impl RoomState {
    /// Computes the state that `trigger` leads to.
    ///
    /// Every pair not listed in the diagram above is rejected with
    /// [`RoomError::InvalidState`]; `self` is never modified.
    pub fn apply(self, trigger: Trigger) -> Result<Self, RoomError> {
        use RoundPhase::{Active, Intermission};

        match (self, trigger) {
            (Self::Setup, Trigger::PuzzlesLoaded) => Ok(Self::Lobby),
            (Self::Lobby, Trigger::Start) => Ok(Self::Playing {
                round: 0,
                phase: Active,
            }),
            (Self::Playing { round, phase: Active }, Trigger::EndRound) => {
                Ok(Self::Playing {
                    round,
                    phase: Intermission,
                })
            }
            (
                Self::Playing {
                    round,
                    phase: Intermission,
                },
                Trigger::Advance { total_rounds },
            ) => {
                if round + 1 < total_rounds {
                    Ok(Self::Playing {
                        round: round + 1,
                        phase: Active,
                    })
                } else {
                    Ok(Self::Finished)
                }
            }
            (state, trigger) => Err(RoomError::InvalidState(format!(
                "cannot {} while {state}",
                trigger.verb()
            ))),
        }
    }

    /// Coarse phase as reported on the wire.
    pub fn phase(self) -> RoomPhase {
        match self {
            Self::Setup => RoomPhase::Setup,
            Self::Lobby => RoomPhase::Lobby,
            Self::Playing { .. } => RoomPhase::Playing,
            Self::Finished => RoomPhase::Finished,
        }
    }

    /// `true` if players may join.
    pub fn is_joinable(self) -> bool {
        !matches!(self, Self::Setup)
    }

    /// The round currently accepting guesses, if any.
    pub fn active_round(self) -> Option<usize> {
        match self {
            Self::Playing {
                round,
                phase: RoundPhase::Active,
            } => Some(round),
            _ => None,
        }
    }
}

impl Trigger {
    fn verb(self) -> &'static str {
        match self {
            Self::PuzzlesLoaded => "load puzzles",
            Self::Start => "start a game",
            Self::EndRound => "end the round",
            Self::Advance { .. } => "advance",
        }
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "in setup"),
            Self::Lobby => write!(f, "in the lobby"),
            Self::Playing { round, phase: RoundPhase::Active } => {
                write!(f, "playing round {}", round + 1)
            }
            Self::Playing {
                round,
                phase: RoundPhase::Intermission,
            } => write!(f, "between rounds after round {}", round + 1),
            Self::Finished => write!(f, "finished"),
        }
    }
}
