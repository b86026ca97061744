//! The Room aggregate: players, puzzles, the round clock, and fan-out.
//!
//! A `Room` is plain data owned by exactly one actor task (see
//! `actor.rs`). Every method runs to completion before the next command
//! or timer is looked at, so there is no locking and no interleaving to
//! reason about inside this file.
//!
//! Outbound events go straight into the per-connection channels in
//! `subscribers`; a closed channel just means that connection is gone.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::time::Duration;

use rebus_protocol::{
    LeaderboardEntry, MatchKind, PlayerId, RoomCode, RoomPhase, ServerEvent, SessionToken,
};
use rebus_session::{SessionConfig, SessionManager};
use rebus_timer::{Fired, Generation, TimerSet};
use rebus_transport::ConnectionId;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::state::{RoomState, Trigger};
use crate::{GameConfig, Puzzle, PuzzleSource, RoomError, evaluate, score};

/// Channel a room pushes events into for one connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// What the room-status endpoint reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomStatus {
    pub code: RoomCode,
    pub state: RoomPhase,
    pub online_player_count: usize,
    pub total_rounds: usize,
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// What a scheduled callback does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Hint(u8),
    RoundEnd,
    Advance,
    Reap,
}

#[derive(Debug, Clone)]
struct Player {
    id: PlayerId,
    name: String,
    score: u32,
    online: bool,
    guessed_this_round: bool,
    join_order: u64,
}

impl Player {
    fn entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            player_id: self.id,
            name: self.name.clone(),
            score: self.score,
            online: self.online,
            guessed_this_round: self.guessed_this_round,
        }
    }
}

/// The round currently on the clock.
#[derive(Debug, Clone, Copy)]
struct RoundClock {
    started: Instant,
    length: Duration,
}

impl RoundClock {
    fn remaining(&self) -> Duration {
        self.length.saturating_sub(self.started.elapsed())
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One game room. Only ever driven by its actor; see [`RoomRegistry`](crate::RoomRegistry).
pub(crate) struct Room {
    code: RoomCode,
    host_key: String,
    config: GameConfig,
    state: RoomState,

    puzzles: Vec<Puzzle>,
    total_rounds: usize,
    time_per_round: u32,
    clock: Option<RoundClock>,
    hints_revealed: u8,

    players: HashMap<PlayerId, Player>,
    sessions: SessionManager,
    /// Players that scored in the current round. Survives reconnects,
    /// unlike anything tied to a connection.
    round_answered: HashSet<PlayerId>,
    next_join_order: u64,

    host: Option<ConnectionId>,
    subscribers: HashMap<ConnectionId, EventSender>,

    pub(crate) timers: TimerSet<TimerKind>,
    generation: Generation,
    reap_generation: Generation,
    reap_armed: bool,
}

impl Room {
    /// Creates an empty room in `Setup`. The reap timer starts right away
    /// so a room nobody ever opens does not live forever.
    pub fn new(code: RoomCode, host_key: String, config: GameConfig) -> Self {
        let mut room = Self {
            code,
            host_key,
            config,
            state: RoomState::Setup,
            puzzles: Vec::new(),
            total_rounds: 0,
            time_per_round: 0,
            clock: None,
            hints_revealed: 0,
            players: HashMap::new(),
            sessions: SessionManager::new(SessionConfig::default()),
            round_answered: HashSet::new(),
            next_join_order: 0,
            host: None,
            subscribers: HashMap::new(),
            timers: TimerSet::new(),
            generation: Generation::INITIAL,
            reap_generation: Generation::INITIAL,
            reap_armed: false,
        };
        room.arm_reap_if_abandoned();
        room
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn status(&self) -> RoomStatus {
        RoomStatus {
            code: self.code.clone(),
            state: self.state.phase(),
            online_player_count: self.online_count(),
            total_rounds: self.total_rounds,
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Installs the puzzle list and opens the lobby.
    pub fn load_puzzles(&mut self, sources: Vec<PuzzleSource>) -> Result<usize, RoomError> {
        let next = self.state.apply(Trigger::PuzzlesLoaded)?;
        if sources.is_empty() {
            return Err(RoomError::InvalidInput("puzzle list is empty".into()));
        }
        let puzzles = sources
            .into_iter()
            .map(Puzzle::new)
            .collect::<Result<Vec<_>, _>>()?;

        self.puzzles = puzzles;
        self.state = next;
        info!(room = %self.code, puzzles = self.puzzles.len(), "puzzles loaded");
        Ok(self.puzzles.len())
    }

    /// Attaches `connection` as the host display.
    ///
    /// With the room's host key the role is always taken over. Without
    /// it, only a vacant host seat (or the current host reconnecting on
    /// the same connection) can be claimed.
    pub fn host_join(
        &mut self,
        connection: ConnectionId,
        host_key: Option<String>,
        sender: EventSender,
    ) -> Result<(), RoomError> {
        match host_key {
            Some(key) if key != self.host_key => {
                return Err(RoomError::Unauthorized("wrong host key".into()));
            }
            None if self.host.is_some_and(|host| host != connection) => {
                return Err(RoomError::Unauthorized("room already has a host".into()));
            }
            _ => {}
        }

        if let Some(previous) = self.host.replace(connection) {
            if previous != connection {
                info!(room = %self.code, %previous, %connection, "host replaced");
            }
        }
        self.subscribers.insert(connection, sender);
        self.disarm_reap();

        self.send_to(
            connection,
            ServerEvent::HostJoined {
                room_code: self.code.clone(),
                state: self.state.phase(),
                puzzle_count: self.puzzles.len(),
                leaderboard: self.leaderboard(),
            },
        );
        self.replay_round(connection, None);
        info!(room = %self.code, %connection, "host joined");
        Ok(())
    }

    /// Joins or rejoins a player.
    ///
    /// A known `token` restores the same player with their score; the
    /// name is updated when a usable one is given. Anything else creates
    /// a new player.
    pub fn join(
        &mut self,
        connection: ConnectionId,
        name: &str,
        token: Option<SessionToken>,
        sender: EventSender,
    ) -> Result<PlayerId, RoomError> {
        if !self.state.is_joinable() {
            return Err(RoomError::InvalidState("room is not open yet".into()));
        }

        let name = self.clean_name(name);
        let known = token
            .as_ref()
            .is_some_and(|t| self.sessions.lookup(t).is_some());
        if !known && name.is_none() {
            return Err(RoomError::InvalidInput(format!(
                "name must be 1 to {} characters",
                self.config.max_name_len
            )));
        }

        let admission = self
            .sessions
            .admit(token, connection)
            .map_err(|e| RoomError::InvalidInput(e.to_string()))?;
        let player_id = admission.player_id;

        if let Some(old) = admission.displaced {
            self.subscribers.remove(&old);
            debug!(room = %self.code, %player_id, connection = %old, "connection displaced");
        }
        if let Some(previous) = admission.detached {
            // The connection switched identities; its old player is gone.
            self.mark_offline(previous, connection);
        }

        let next_join_order = &mut self.next_join_order;
        let player = self.players.entry(player_id).or_insert_with(|| {
            let join_order = *next_join_order;
            *next_join_order += 1;
            Player {
                id: player_id,
                name: String::new(),
                score: 0,
                online: false,
                guessed_this_round: false,
                join_order,
            }
        });
        if let Some(name) = name {
            player.name = name;
        }
        player.online = true;
        let name = player.name.clone();
        let score = player.score;

        self.subscribers.insert(connection, sender);
        self.disarm_reap();

        self.send_to(
            connection,
            ServerEvent::Joined {
                room_code: self.code.clone(),
                player_id,
                session_token: admission.token,
                name: name.clone(),
                score,
                state: self.state.phase(),
                reconnected: admission.reconnected,
            },
        );
        self.broadcast_except(
            connection,
            ServerEvent::PlayerJoined {
                player_id,
                name: name.clone(),
                reconnected: admission.reconnected,
            },
        );
        self.broadcast_leaderboard();
        self.replay_round(connection, Some(player_id));

        info!(
            room = %self.code,
            %player_id,
            %connection,
            name = %name,
            reconnected = admission.reconnected,
            "player joined"
        );
        Ok(player_id)
    }

    /// Evaluates and scores a guess from the player behind `connection`.
    pub fn submit_guess(&mut self, connection: ConnectionId, guess: &str) -> Result<(), RoomError> {
        let player_id = self
            .sessions
            .player_for(connection)
            .ok_or_else(|| RoomError::InvalidState("join the room before guessing".into()))?;
        let round = self
            .state
            .active_round()
            .ok_or_else(|| RoomError::InvalidState("no round in progress".into()))?;
        if self.round_answered.contains(&player_id) {
            return Err(RoomError::Duplicate(format!(
                "{player_id} already scored this round"
            )));
        }
        let (Some(puzzle), Some(clock)) = (self.puzzles.get(round), self.clock) else {
            warn!(room = %self.code, round, "active round without puzzle or clock");
            return Err(RoomError::InvalidState("no round in progress".into()));
        };

        let evaluation = evaluate(guess, puzzle.answer());
        let points = score(
            clock.remaining().as_secs_f64(),
            f64::from(self.time_per_round),
            evaluation.kind,
            evaluation.similarity,
        );

        let Some(player) = self.players.get_mut(&player_id) else {
            warn!(room = %self.code, %player_id, "session without player");
            return Err(RoomError::InvalidState("join the room before guessing".into()));
        };
        if evaluation.is_scoring() {
            player.score += points;
            player.guessed_this_round = true;
        }
        let total = player.score;
        let name = player.name.clone();

        self.send_to(
            connection,
            ServerEvent::GuessResult {
                outcome: evaluation.kind,
                similarity: evaluation.similarity,
                points,
                score: total,
            },
        );
        if !evaluation.is_scoring() {
            debug!(room = %self.code, %player_id, "wrong guess");
            return Ok(());
        }

        self.round_answered.insert(player_id);
        info!(
            room = %self.code,
            %player_id,
            points,
            exact = matches!(evaluation.kind, MatchKind::Correct),
            "player scored"
        );
        self.broadcast(ServerEvent::PlayerGuessed { player_id, name });
        self.broadcast_leaderboard();
        self.end_round_if_everyone_answered();
        Ok(())
    }

    /// Host only: leaves the lobby and begins round 0.
    pub fn start_game(
        &mut self,
        connection: ConnectionId,
        rounds: usize,
        seconds_per_round: u32,
    ) -> Result<(), RoomError> {
        self.require_host(connection)?;
        let next = self.state.apply(Trigger::Start)?;

        self.total_rounds = self.config.clamp_rounds(rounds, self.puzzles.len());
        self.time_per_round = self.config.clamp_round_secs(seconds_per_round);
        for player in self.players.values_mut() {
            player.score = 0;
            player.guessed_this_round = false;
        }
        self.state = next;
        info!(
            room = %self.code,
            rounds = self.total_rounds,
            seconds = self.time_per_round,
            "game started"
        );
        self.begin_round(0);
        Ok(())
    }

    /// Host only: ends the current round if it is still running, then
    /// moves on without waiting for the auto-advance.
    pub fn next_round(&mut self, connection: ConnectionId) -> Result<(), RoomError> {
        self.require_host(connection)?;
        if self.state.active_round().is_some() {
            self.end_round()?;
        }
        self.advance()
    }

    /// Detaches a connection, whichever role it played.
    pub fn disconnect(&mut self, connection: ConnectionId) {
        self.subscribers.remove(&connection);
        let was_host = self.host == Some(connection);
        if was_host {
            self.host = None;
        }

        if let Ok(player_id) = self.sessions.disconnect(connection) {
            self.mark_offline(player_id, connection);
            self.end_round_if_everyone_answered();
        }

        if was_host {
            info!(room = %self.code, %connection, "host left");
            if let Some(successor) = self.earliest_online_connection() {
                self.promote(successor);
            }
        }
        self.arm_reap_if_abandoned();
    }

    fn mark_offline(&mut self, player_id: PlayerId, connection: ConnectionId) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        player.online = false;
        let name = player.name.clone();
        info!(room = %self.code, %player_id, %connection, "player left");
        self.broadcast(ServerEvent::PlayerLeft { player_id, name });
        self.broadcast_leaderboard();
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Handles a fired timer. Breaks when the room should shut down.
    pub(crate) fn on_timer(&mut self, fired: Fired<TimerKind>) -> ControlFlow<()> {
        if fired.kind == TimerKind::Reap {
            return self.on_reap(fired);
        }
        if fired.is_stale(self.generation) {
            trace!(room = %self.code, kind = ?fired.kind, "stale timer ignored");
            return ControlFlow::Continue(());
        }

        let result = match fired.kind {
            TimerKind::Hint(level) => {
                self.reveal_hint(level);
                Ok(())
            }
            TimerKind::RoundEnd => self.end_round(),
            TimerKind::Advance => self.advance(),
            TimerKind::Reap => Ok(()),
        };
        if let Err(e) = result {
            warn!(room = %self.code, kind = ?fired.kind, error = %e, "timer could not be applied");
        }
        ControlFlow::Continue(())
    }

    fn on_reap(&mut self, fired: Fired<TimerKind>) -> ControlFlow<()> {
        if fired.is_stale(self.reap_generation) {
            trace!(room = %self.code, "stale reap ignored");
            return ControlFlow::Continue(());
        }
        self.reap_armed = false;
        if self.is_abandoned() {
            info!(room = %self.code, "room reaped");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// Cancels everything still scheduled. Called once the actor stops.
    pub(crate) fn teardown(&mut self) {
        let cancelled = self.timers.clear();
        self.subscribers.clear();
        debug!(room = %self.code, cancelled, "room torn down");
    }

    // -----------------------------------------------------------------------
    // Round flow
    // -----------------------------------------------------------------------

    /// Invalidates every round timer issued so far.
    fn bump_generation(&mut self) {
        let current = self.generation;
        self.timers
            .cancel_where(|_, kind, generation| generation == current && *kind != TimerKind::Reap);
        self.generation = current.next();
    }

    fn begin_round(&mut self, round: usize) {
        let Some(puzzle) = self.puzzles.get(round) else {
            warn!(room = %self.code, round, "no puzzle for round");
            return;
        };
        let image = puzzle.image().to_owned();

        self.bump_generation();
        self.round_answered.clear();
        for player in self.players.values_mut() {
            player.guessed_this_round = false;
        }
        self.hints_revealed = 0;
        let length = Duration::from_secs(u64::from(self.time_per_round));
        self.clock = Some(RoundClock {
            started: Instant::now(),
            length,
        });

        let [hint1, hint2, end] = self.config.round_schedule(self.time_per_round);
        self.timers.schedule(TimerKind::Hint(1), self.generation, hint1);
        self.timers.schedule(TimerKind::Hint(2), self.generation, hint2);
        self.timers.schedule(TimerKind::RoundEnd, self.generation, end);

        info!(room = %self.code, round = round + 1, total = self.total_rounds, "round started");
        self.broadcast(ServerEvent::NewRound {
            round: round + 1,
            total_rounds: self.total_rounds,
            image,
            time_per_round: self.time_per_round,
            remaining: None,
        });
        self.broadcast_leaderboard();
    }

    fn reveal_hint(&mut self, level: u8) {
        let Some(round) = self.state.active_round() else {
            return;
        };
        let Some(text) = self.puzzles.get(round).and_then(|p| p.hint(level)) else {
            return;
        };
        let text = text.to_owned();
        self.hints_revealed = self.hints_revealed.max(level);
        debug!(room = %self.code, level, "hint revealed");
        self.broadcast(ServerEvent::Hint { level, text });
    }

    fn end_round(&mut self) -> Result<(), RoomError> {
        let next = self.state.apply(Trigger::EndRound)?;
        let RoomState::Playing { round, .. } = next else {
            return Ok(());
        };

        self.bump_generation();
        self.state = next;
        self.clock = None;

        let is_last_round = round + 1 >= self.total_rounds;
        let answer = self
            .puzzles
            .get(round)
            .map(|p| p.answer().to_owned())
            .unwrap_or_default();
        info!(room = %self.code, round = round + 1, is_last_round, "round ended");
        self.broadcast(ServerEvent::RoundEnd {
            answer,
            leaderboard: self.leaderboard(),
            is_last_round,
        });

        let delay = if is_last_round {
            self.config.finish_delay
        } else {
            self.config.advance_delay
        };
        self.timers.schedule(TimerKind::Advance, self.generation, delay);
        Ok(())
    }

    fn advance(&mut self) -> Result<(), RoomError> {
        let next = self.state.apply(Trigger::Advance {
            total_rounds: self.total_rounds,
        })?;
        self.bump_generation();
        self.state = next;

        match next {
            RoomState::Playing { round, .. } => self.begin_round(round),
            RoomState::Finished => {
                info!(room = %self.code, "game over");
                self.broadcast(ServerEvent::GameOver {
                    leaderboard: self.leaderboard(),
                });
            }
            RoomState::Setup | RoomState::Lobby => {}
        }
        Ok(())
    }

    /// Ends the round early once every online player has scored.
    fn end_round_if_everyone_answered(&mut self) {
        if self.state.active_round().is_none() {
            return;
        }
        let mut online = self.players.values().filter(|p| p.online).peekable();
        let everyone = online.peek().is_some()
            && online.all(|p| self.round_answered.contains(&p.id));
        if everyone {
            debug!(room = %self.code, "everyone answered");
            if let Err(e) = self.end_round() {
                warn!(room = %self.code, error = %e, "early round end failed");
            }
        }
    }

    /// Catches a connection up on the round in progress.
    fn replay_round(&self, connection: ConnectionId, player: Option<PlayerId>) {
        let Some(round) = self.state.active_round() else {
            return;
        };
        let (Some(puzzle), Some(clock)) = (self.puzzles.get(round), self.clock) else {
            return;
        };

        self.send_to(
            connection,
            ServerEvent::NewRound {
                round: round + 1,
                total_rounds: self.total_rounds,
                image: puzzle.image().to_owned(),
                time_per_round: self.time_per_round,
                remaining: Some(clock.remaining().as_secs() as u32),
            },
        );
        for level in 1..=self.hints_revealed {
            if let Some(text) = puzzle.hint(level) {
                self.send_to(
                    connection,
                    ServerEvent::Hint {
                        level,
                        text: text.to_owned(),
                    },
                );
            }
        }
        if player.is_some_and(|id| self.round_answered.contains(&id)) {
            self.send_to(connection, ServerEvent::AlreadyAnswered);
        }
    }

    // -----------------------------------------------------------------------
    // Host & reaping
    // -----------------------------------------------------------------------

    fn require_host(&self, connection: ConnectionId) -> Result<(), RoomError> {
        if self.host == Some(connection) {
            Ok(())
        } else {
            Err(RoomError::Unauthorized(format!("{connection} is not the host")))
        }
    }

    fn promote(&mut self, connection: ConnectionId) {
        self.host = Some(connection);
        info!(room = %self.code, %connection, "host promoted");
        self.send_to(connection, ServerEvent::HostPromoted);
    }

    /// Connection of the online player who joined first.
    fn earliest_online_connection(&self) -> Option<ConnectionId> {
        self.players
            .values()
            .filter(|p| p.online)
            .filter_map(|p| {
                self.sessions
                    .connection_of(p.id)
                    .map(|conn| (p.join_order, conn))
            })
            .min_by_key(|(order, _)| *order)
            .map(|(_, conn)| conn)
    }

    fn is_abandoned(&self) -> bool {
        self.host.is_none() && self.online_count() == 0
    }

    fn arm_reap_if_abandoned(&mut self) {
        if self.reap_armed || !self.is_abandoned() {
            return;
        }
        self.reap_generation = self.reap_generation.next();
        self.timers
            .schedule(TimerKind::Reap, self.reap_generation, self.config.reap_grace);
        self.reap_armed = true;
        debug!(room = %self.code, grace = ?self.config.reap_grace, "reap armed");
    }

    fn disarm_reap(&mut self) {
        if !self.reap_armed {
            return;
        }
        self.timers.cancel_where(|_, kind, _| *kind == TimerKind::Reap);
        self.reap_generation = self.reap_generation.next();
        self.reap_armed = false;
        debug!(room = %self.code, "reap disarmed");
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    fn send_to(&self, connection: ConnectionId, event: ServerEvent) {
        if let Some(sender) = self.subscribers.get(&connection) {
            if sender.send(event).is_err() {
                debug!(room = %self.code, %connection, "subscriber gone");
            }
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        for sender in self.subscribers.values() {
            let _ = sender.send(event.clone());
        }
    }

    fn broadcast_except(&self, excluded: ConnectionId, event: ServerEvent) {
        for (connection, sender) in &self.subscribers {
            if *connection != excluded {
                let _ = sender.send(event.clone());
            }
        }
    }

    fn broadcast_leaderboard(&self) {
        self.broadcast(ServerEvent::Leaderboard {
            players: self.leaderboard(),
        });
    }

    /// Players by descending score, earliest joiner first on ties.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by(|a, b| b.score.cmp(&a.score).then(a.join_order.cmp(&b.join_order)));
        players.into_iter().map(Player::entry).collect()
    }

    fn online_count(&self) -> usize {
        self.players.values().filter(|p| p.online).count()
    }

    fn clean_name(&self, raw: &str) -> Option<String> {
        let name = raw.trim();
        let len = name.chars().count();
        (1..=self.config.max_name_len)
            .contains(&len)
            .then(|| name.to_owned())
    }
}
