//! Rooms for Rebus: the round state machine, guess evaluation, scoring,
//! and the registry that keeps rooms alive.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! players, its puzzles, and its timers. Nothing outside the task touches
//! room state; the rest of the server talks to it through a cloneable
//! [`RoomHandle`].
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, finds them by code, sweeps dead ones
//! - [`RoomHandle`]: sends commands to a running room actor
//! - [`RoomState`]: lifecycle state machine with an explicit transition table
//! - [`evaluate`] / [`score`]: the pure guess-to-points pipeline
//! - [`GameConfig`]: round timing, hint schedule, limits

mod actor;
mod config;
mod error;
mod evaluate;
mod puzzle;
mod registry;
mod room;
mod score;
mod state;

pub use actor::RoomHandle;
pub use config::GameConfig;
pub use error::RoomError;
pub use evaluate::{Evaluation, evaluate, levenshtein, normalize};
pub use puzzle::{Puzzle, PuzzleSource};
pub use registry::{
    CreatedRoom, InMemoryRoomStore, RoomRegistry, RoomStore, generate_room_code,
};
pub use room::{EventSender, RoomStatus};
pub use score::{MAX_POINTS, MIN_POINTS, score};
pub use state::{RoomState, RoundPhase, Trigger};
