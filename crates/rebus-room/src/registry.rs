//! Room registry: creates rooms, finds them by code, forgets dead ones.
//!
//! Storage is behind the [`RoomStore`] trait so the registry logic does
//! not care where handles live. The registry wraps its store in a
//! `tokio::sync::Mutex` that is only held for map operations; talking to
//! a room always happens on a cloned [`RoomHandle`] after the lock is
//! released.

use std::collections::HashMap;

use rand::Rng;
use rebus_protocol::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomCode};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::actor::spawn_room;
use crate::room::{Room, RoomStatus};
use crate::{GameConfig, PuzzleSource, RoomError, RoomHandle};

/// Random bytes in a host key; rendered as hex.
const HOST_KEY_BYTES: usize = 16;

// ---------------------------------------------------------------------------
// RoomStore
// ---------------------------------------------------------------------------

/// Keyed storage for live room handles.
pub trait RoomStore: Send {
    fn get(&self, code: &RoomCode) -> Option<RoomHandle>;

    /// Stores a handle, replacing any previous one under the same code.
    fn put(&mut self, handle: RoomHandle);

    fn remove(&mut self, code: &RoomCode) -> Option<RoomHandle>;

    fn contains(&self, code: &RoomCode) -> bool;

    fn codes(&self) -> Vec<RoomCode>;

    /// Drops every handle whose actor has stopped and returns their codes.
    fn sweep(&mut self) -> Vec<RoomCode>;
}

/// [`RoomStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    rooms: HashMap<RoomCode, RoomHandle>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for InMemoryRoomStore {
    fn get(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms.get(code).cloned()
    }

    fn put(&mut self, handle: RoomHandle) {
        self.rooms.insert(handle.code().clone(), handle);
    }

    fn remove(&mut self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms.remove(code)
    }

    fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    fn codes(&self) -> Vec<RoomCode> {
        self.rooms.keys().cloned().collect()
    }

    fn sweep(&mut self) -> Vec<RoomCode> {
        let dead: Vec<RoomCode> = self
            .rooms
            .iter()
            .filter(|(_, handle)| handle.is_closed())
            .map(|(code, _)| code.clone())
            .collect();
        for code in &dead {
            self.rooms.remove(code);
        }
        dead
    }
}

// ---------------------------------------------------------------------------
// RoomRegistry
// ---------------------------------------------------------------------------

/// What the creation surface gets back: the code players type, and the
/// key that lets a host display claim the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRoom {
    pub code: RoomCode,
    pub host_key: String,
}

/// Process-wide directory of live rooms.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct RoomRegistry<S: RoomStore = InMemoryRoomStore> {
    store: Mutex<S>,
    config: GameConfig,
}

impl RoomRegistry<InMemoryRoomStore> {
    /// Creates a registry with in-memory storage.
    pub fn new(config: GameConfig) -> Self {
        Self::with_store(InMemoryRoomStore::new(), config)
    }
}

impl Default for RoomRegistry<InMemoryRoomStore> {
    fn default() -> Self {
        Self::new(GameConfig::default())
    }
}

impl<S: RoomStore> RoomRegistry<S> {
    pub fn with_store(store: S, config: GameConfig) -> Self {
        Self {
            store: Mutex::new(store),
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Creates a room in setup and spawns its actor.
    ///
    /// The code is unique among rooms still held by the store.
    pub async fn create_room(&self) -> CreatedRoom {
        let mut store = self.store.lock().await;
        let code = loop {
            let candidate = generate_room_code();
            if !store.contains(&candidate) {
                break candidate;
            }
        };
        let host_key = generate_host_key();

        let room = Room::new(code.clone(), host_key.clone(), self.config.clone());
        store.put(spawn_room(room, self.config.channel_size));
        info!(room = %code, "room created");

        CreatedRoom { code, host_key }
    }

    /// Looks up a live room.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no room has this code or its actor has
    /// already stopped.
    pub async fn get(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        let store = self.store.lock().await;
        store
            .get(code)
            .filter(|handle| !handle.is_closed())
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Hands a room its puzzles. Moves it from setup to lobby.
    pub async fn load_puzzles(
        &self,
        code: &RoomCode,
        puzzles: Vec<PuzzleSource>,
    ) -> Result<usize, RoomError> {
        self.get(code).await?.load_puzzles(puzzles).await
    }

    pub async fn status(&self, code: &RoomCode) -> Result<RoomStatus, RoomError> {
        self.get(code).await?.status().await
    }

    /// Stops a room and forgets it.
    pub async fn remove(&self, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self
            .store
            .lock()
            .await
            .remove(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        let _ = handle.shutdown().await;
        info!(room = %code, "room removed");
        Ok(())
    }

    /// Forgets every room whose actor has stopped.
    pub async fn sweep(&self) -> Vec<RoomCode> {
        let swept = self.store.lock().await.sweep();
        for code in &swept {
            info!(room = %code, "room swept");
        }
        if swept.is_empty() {
            debug!("sweep found nothing to remove");
        }
        swept
    }

    /// Codes of every room the store still holds.
    pub async fn codes(&self) -> Vec<RoomCode> {
        self.store.lock().await.codes()
    }

    pub async fn room_count(&self) -> usize {
        self.store.lock().await.codes().len()
    }
}

/// A random code over the unambiguous alphabet.
pub fn generate_room_code() -> RoomCode {
    let alphabet = ROOM_CODE_ALPHABET.as_bytes();
    let mut rng = rand::rng();
    loop {
        let raw: String = (0..ROOM_CODE_LEN)
            .map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())]))
            .collect();
        if let Ok(code) = RoomCode::parse(&raw) {
            return code;
        }
    }
}

fn generate_host_key() -> String {
    let mut rng = rand::rng();
    (0..HOST_KEY_BYTES)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect()
}
