//! Player sessions and reconnection for Rebus.
//!
//! Each room owns one [`SessionManager`]. It answers a single question on
//! every join: *is this someone we have seen before?* A known session token
//! maps back to the same [`PlayerId`](rebus_protocol::PlayerId) no matter
//! how many sockets the player has burned through; an absent or unknown
//! token gets a brand-new identity.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← scores, names, rounds keyed by PlayerId
//!     ↕
//! Session Layer (this crate)  ← SessionToken ↔ PlayerId ↔ ConnectionId
//!     ↕
//! Protocol / Transport (below)  ← identifiers
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Admission, Session, SessionConfig, SessionState};
