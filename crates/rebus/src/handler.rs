//! Per-connection handler: decode commands, route them to rooms, and
//! stream room events back.
//!
//! Each accepted connection gets its own Tokio task running this handler,
//! plus one writer task:
//!
//! ```text
//!  socket ──recv──→ handler loop ──RoomHandle──→ room actor
//!                                                   │
//!  socket ←─send─── writer task ←──mpsc<ServerEvent>┘
//! ```
//!
//! Rooms never touch the socket. They push into the connection's event
//! channel and the writer encodes and sends, so a slow client only ever
//! delays itself.

use std::collections::HashMap;
use std::sync::Arc;

use rebus_protocol::{ClientCommand, Codec, RoomCode, ServerEvent};
use rebus_room::{EventSender, RoomError, RoomHandle};
use rebus_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::RebusError;
use crate::server::ServerState;

/// Rooms this connection has joined, in any role.
///
/// Dropping it tells every one of those rooms the connection is gone.
/// This runs even if the handler panics; since `Drop` is synchronous the
/// notifications go out from a fire-and-forget task.
struct Memberships {
    connection: ConnectionId,
    rooms: HashMap<RoomCode, RoomHandle>,
    /// The room `start_game` and `next_round` act on.
    hosting: Option<RoomCode>,
}

impl Memberships {
    fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            rooms: HashMap::new(),
            hosting: None,
        }
    }

    /// Rooms a host command may be meant for: the one joined as host
    /// first, then every other joined room. A player promoted after the
    /// host left only ever joined as a player; the room decides whether
    /// this connection really holds the seat.
    fn host_candidates(&self) -> Vec<(RoomCode, RoomHandle)> {
        let hosted = self
            .hosting
            .as_ref()
            .and_then(|code| self.rooms.get(code).map(|room| (code.clone(), room.clone())));
        let others = self
            .rooms
            .iter()
            .filter(|(code, _)| self.hosting.as_ref() != Some(*code))
            .map(|(code, room)| (code.clone(), room.clone()));
        hosted.into_iter().chain(others).collect()
    }
}

/// Commands only the host may send.
#[derive(Clone, Copy)]
enum HostCommand {
    StartGame {
        rounds: usize,
        seconds_per_round: u32,
    },
    NextRound,
}

impl Drop for Memberships {
    fn drop(&mut self) {
        if self.rooms.is_empty() {
            return;
        }
        let connection = self.connection;
        let rooms: Vec<RoomHandle> = self.rooms.drain().map(|(_, handle)| handle).collect();
        tokio::spawn(async move {
            for room in rooms {
                let _ = room.disconnect(connection).await;
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), RebusError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (events, outbox) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_events(
        Arc::clone(&conn),
        Arc::clone(&state),
        outbox,
    ));
    let mut memberships = Memberships::new(conn_id);

    loop {
        let data = match tokio::time::timeout(state.config.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection timed out");
                break;
            }
        };

        let command: ClientCommand = match state.codec.decode(&data) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode command");
                let _ = events.send(ServerEvent::error(format!("invalid command: {e}")));
                continue;
            }
        };

        if let Err(e) = dispatch(command, &state, &mut memberships, &events).await {
            if let Some(event) = e.to_event() {
                let _ = events.send(event);
            }
        }
    }

    drop(memberships);
    writer.abort();
    Ok(())
}

/// Routes one decoded command to the room it is meant for.
async fn dispatch<C: Codec>(
    command: ClientCommand,
    state: &ServerState<C>,
    memberships: &mut Memberships,
    events: &EventSender,
) -> Result<(), RoomError> {
    let connection = memberships.connection;
    match command {
        ClientCommand::Ping => {
            let _ = events.send(ServerEvent::Pong);
        }

        ClientCommand::HostJoin {
            room_code,
            host_key,
        } => {
            let room = state.registry.get(&room_code).await?;
            room.host_join(connection, host_key, events.clone()).await?;
            memberships.rooms.insert(room_code.clone(), room);
            memberships.hosting = Some(room_code);
        }

        ClientCommand::JoinRoom {
            room_code,
            name,
            session_token,
        } => {
            let room = state.registry.get(&room_code).await?;
            let player_id = room
                .join(connection, name, session_token, events.clone())
                .await?;
            tracing::debug!(%connection, %player_id, room = %room_code, "joined");
            memberships.rooms.insert(room_code, room);
        }

        ClientCommand::StartGame {
            rounds,
            seconds_per_round,
        } => {
            host_command(
                memberships,
                HostCommand::StartGame {
                    rounds,
                    seconds_per_round,
                },
            )
            .await?;
        }

        ClientCommand::SubmitGuess { room_code, guess } => {
            let room = match memberships.rooms.get(&room_code) {
                Some(room) => room.clone(),
                None => state.registry.get(&room_code).await?,
            };
            room.submit_guess(connection, guess).await?;
        }

        ClientCommand::NextRound => {
            host_command(memberships, HostCommand::NextRound).await?;
        }
    }
    Ok(())
}

/// Sends a host command to the first room that accepts this connection as
/// host, and remembers that room for next time.
async fn host_command(
    memberships: &mut Memberships,
    command: HostCommand,
) -> Result<(), RoomError> {
    let connection = memberships.connection;
    let mut outcome = Err(RoomError::InvalidState("join a room first".into()));

    for (code, room) in memberships.host_candidates() {
        outcome = match command {
            HostCommand::StartGame {
                rounds,
                seconds_per_round,
            } => room.start_game(connection, rounds, seconds_per_round).await,
            HostCommand::NextRound => room.next_round(connection).await,
        };
        if !matches!(outcome, Err(RoomError::Unauthorized(_))) {
            memberships.hosting = Some(code);
            break;
        }
    }
    outcome
}

/// Encodes queued events and writes them to the socket until the socket
/// fails or every sender is gone.
async fn write_events<C: Codec>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<C>>,
    mut outbox: mpsc::UnboundedReceiver<ServerEvent>,
) {
    let conn_id = conn.id();
    while let Some(event) = outbox.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, writer stopping");
            break;
        }
    }
}
