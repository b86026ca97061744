//! # Rebus
//!
//! Real-time multi-player picture-guessing rooms over WebSockets.
//!
//! A host creates a room, loads an ordered list of picture puzzles, and
//! projects the room on a shared screen. Players join from their phones
//! with the room's six-character code and race to type what the picture
//! spells. Faster correct answers score more; close-but-wrong answers
//! score a little.
//!
//! This crate ties the layers together:
//!
//! ```text
//! rebus-transport (sockets) → rebus-protocol (JSON) → rebus-room (rules)
//!                                                  ↘ rebus-session (tokens)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rebus::prelude::*;
//!
//! # async fn run() -> Result<(), RebusError> {
//! rebus::init_tracing();
//!
//! let server = RebusServer::builder().bind("0.0.0.0:8080").build().await?;
//!
//! let room = server.registry().create_room().await;
//! server
//!     .registry()
//!     .load_puzzles(
//!         &room.code,
//!         vec![PuzzleSource::new("/img/eiffel.png", "Eiffel Tower")],
//!     )
//!     .await?;
//!
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::RebusError;
pub use server::{RebusServer, RebusServerBuilder, ServerConfig};

/// Installs a `tracing` subscriber that prints to stderr.
///
/// Verbosity comes from `RUST_LOG` and defaults to `info`. Calling it more
/// than once is harmless; only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Everything a server binary or test usually needs.
pub mod prelude {
    pub use crate::{RebusError, RebusServer, RebusServerBuilder, ServerConfig};

    pub use rebus_protocol::{
        ClientCommand, Codec, JsonCodec, LeaderboardEntry, MatchKind, PlayerId, RoomCode,
        RoomPhase, ServerEvent, SessionToken,
    };
    pub use rebus_room::{
        CreatedRoom, GameConfig, PuzzleSource, RoomError, RoomHandle, RoomRegistry, RoomStatus,
    };
    pub use rebus_session::SessionError;
    pub use rebus_transport::{ConnectionId, TransportError};
}
