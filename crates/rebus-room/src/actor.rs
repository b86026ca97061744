//! Room actor: an isolated Tokio task that owns one [`Room`].
//!
//! The task waits on two things at once: commands arriving on its mpsc
//! channel and the next timer in the room's [`TimerSet`](rebus_timer::TimerSet).
//! Whichever is ready first is handled to completion before the other is
//! looked at again, which is what makes the room free of data races
//! without any locks.

use std::ops::ControlFlow;

use rebus_protocol::{PlayerId, RoomCode, SessionToken};
use rebus_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::room::{EventSender, Room, RoomStatus};
use crate::{PuzzleSource, RoomError};

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
///
/// Variants with a `reply` are request/response; the caller waits on the
/// oneshot. `Disconnect` and `Shutdown` are fire-and-forget.
pub(crate) enum RoomCommand {
    LoadPuzzles {
        puzzles: Vec<PuzzleSource>,
        reply: Reply<usize>,
    },
    HostJoin {
        connection: ConnectionId,
        host_key: Option<String>,
        sender: EventSender,
        reply: Reply<()>,
    },
    Join {
        connection: ConnectionId,
        name: String,
        session_token: Option<SessionToken>,
        sender: EventSender,
        reply: Reply<PlayerId>,
    },
    SubmitGuess {
        connection: ConnectionId,
        guess: String,
        reply: Reply<()>,
    },
    StartGame {
        connection: ConnectionId,
        rounds: usize,
        seconds_per_round: u32,
        reply: Reply<()>,
    },
    NextRound {
        connection: ConnectionId,
        reply: Reply<()>,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Status {
        reply: oneshot::Sender<RoomStatus>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone. Once the actor stops, every method returns
/// [`RoomError::Unavailable`] and [`RoomHandle::is_closed`] turns `true`.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("code", &self.code)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.code.clone())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    /// Installs the puzzle list and moves the room from setup to lobby.
    pub async fn load_puzzles(&self, puzzles: Vec<PuzzleSource>) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::LoadPuzzles { puzzles, reply })
            .await
    }

    /// Attaches a connection as the host display.
    pub async fn host_join(
        &self,
        connection: ConnectionId,
        host_key: Option<String>,
        sender: EventSender,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::HostJoin {
            connection,
            host_key,
            sender,
            reply,
        })
        .await
    }

    /// Joins or rejoins a player. Events, starting with `joined`, arrive
    /// on `sender`.
    pub async fn join(
        &self,
        connection: ConnectionId,
        name: String,
        session_token: Option<SessionToken>,
        sender: EventSender,
    ) -> Result<PlayerId, RoomError> {
        self.request(|reply| RoomCommand::Join {
            connection,
            name,
            session_token,
            sender,
            reply,
        })
        .await
    }

    pub async fn submit_guess(
        &self,
        connection: ConnectionId,
        guess: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SubmitGuess {
            connection,
            guess,
            reply,
        })
        .await
    }

    pub async fn start_game(
        &self,
        connection: ConnectionId,
        rounds: usize,
        seconds_per_round: u32,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartGame {
            connection,
            rounds,
            seconds_per_round,
            reply,
        })
        .await
    }

    pub async fn next_round(&self, connection: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::NextRound { connection, reply })
            .await
    }

    /// Tells the room a connection is gone (fire-and-forget).
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Disconnect { connection })
            .await
            .map_err(|_| self.unavailable())
    }

    pub async fn status(&self) -> Result<RoomStatus, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Status { reply: reply_tx })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }
}

// ---------------------------------------------------------------------------
// Actor loop
// ---------------------------------------------------------------------------

/// Spawns the actor task for `room` and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub(crate) fn spawn_room(room: Room, channel_size: usize) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let code = room.code().clone();
    tokio::spawn(run(room, rx));
    RoomHandle { code, sender: tx }
}

async fn run(mut room: Room, mut receiver: mpsc::Receiver<RoomCommand>) {
    info!(room = %room.code(), "room actor started");

    loop {
        let flow = tokio::select! {
            cmd = receiver.recv() => match cmd {
                Some(cmd) => handle(&mut room, cmd),
                None => ControlFlow::Break(()),
            },
            fired = room.timers.next_due() => room.on_timer(fired),
        };
        if flow.is_break() {
            break;
        }
    }

    room.teardown();
    info!(room = %room.code(), "room actor stopped");
}

fn handle(room: &mut Room, cmd: RoomCommand) -> ControlFlow<()> {
    match cmd {
        RoomCommand::LoadPuzzles { puzzles, reply } => {
            let _ = reply.send(room.load_puzzles(puzzles));
        }
        RoomCommand::HostJoin {
            connection,
            host_key,
            sender,
            reply,
        } => {
            let result = room.host_join(connection, host_key, sender);
            log_rejected(room, connection, &result);
            let _ = reply.send(result);
        }
        RoomCommand::Join {
            connection,
            name,
            session_token,
            sender,
            reply,
        } => {
            let result = room.join(connection, &name, session_token, sender);
            log_rejected(room, connection, &result);
            let _ = reply.send(result);
        }
        RoomCommand::SubmitGuess {
            connection,
            guess,
            reply,
        } => {
            let result = room.submit_guess(connection, &guess);
            log_rejected(room, connection, &result);
            let _ = reply.send(result);
        }
        RoomCommand::StartGame {
            connection,
            rounds,
            seconds_per_round,
            reply,
        } => {
            let result = room.start_game(connection, rounds, seconds_per_round);
            log_rejected(room, connection, &result);
            let _ = reply.send(result);
        }
        RoomCommand::NextRound { connection, reply } => {
            let result = room.next_round(connection);
            log_rejected(room, connection, &result);
            let _ = reply.send(result);
        }
        RoomCommand::Disconnect { connection } => room.disconnect(connection),
        RoomCommand::Status { reply } => {
            let _ = reply.send(room.status());
        }
        RoomCommand::Shutdown => {
            info!(room = %room.code(), "room shutting down");
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

fn log_rejected<T>(room: &Room, connection: ConnectionId, result: &Result<T, RoomError>) {
    if let Err(e) = result {
        debug!(
            room = %room.code(),
            %connection,
            error = %e,
            surfaced = e.is_surfaced(),
            "command rejected"
        );
    }
}
