//! Wire protocol for Rebus.
//!
//! - **Identifiers** ([`PlayerId`], [`RoomCode`], [`SessionToken`]) —
//!   newtypes shared by every layer above.
//! - **Messages** ([`ClientCommand`], [`ServerEvent`]) — the JSON shapes
//!   exchanged with the browser client.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — bytes ↔ messages.
//!
//! ```text
//! Transport (bytes) → Protocol (commands / events) → Room (rules)
//! ```

mod codec;
mod error;
mod ids;
mod messages;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use ids::{PlayerId, ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomCode, SessionToken};
pub use messages::{
    ClientCommand, LeaderboardEntry, MatchKind, RoomPhase, ServerEvent,
};
