//! Integration tests for the room system.
//!
//! Every test drives a real room actor through its [`RoomHandle`] and
//! reads what it pushes into per-connection channels. Time is paused, so
//! round timers fire as soon as the runtime goes idle and elapsed times
//! can be asserted exactly.

use std::time::Duration;

use rebus_protocol::{MatchKind, PlayerId, RoomPhase, ServerEvent, SessionToken};
use rebus_room::{
    CreatedRoom, EventSender, PuzzleSource, RoomError, RoomHandle, RoomRegistry,
};
use rebus_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

/// One end of a fake connection: the id the room sees and the channel it
/// writes into.
struct Client {
    conn: ConnectionId,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn new(id: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            conn: ConnectionId::new(id),
            tx,
            rx,
        }
    }

    async fn next(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(3600), self.rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Skips events until one matches.
    async fn until(&mut self, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        loop {
            let event = self.next().await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Everything already queued.
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn is_round_end(e: &ServerEvent) -> bool {
    matches!(e, ServerEvent::RoundEnd { .. })
}

fn is_hint(e: &ServerEvent) -> bool {
    matches!(e, ServerEvent::Hint { .. })
}

async fn open_room(answers: &[&str]) -> (RoomRegistry, RoomHandle, CreatedRoom) {
    let registry = RoomRegistry::default();
    let created = registry.create_room().await;
    let puzzles = answers
        .iter()
        .enumerate()
        .map(|(i, answer)| PuzzleSource::new(format!("img-{i}.png"), *answer))
        .collect();
    registry.load_puzzles(&created.code, puzzles).await.unwrap();
    let handle = registry.get(&created.code).await.unwrap();
    (registry, handle, created)
}

async fn attach_host(room: &RoomHandle, created: &CreatedRoom) -> Client {
    let host = Client::new(100);
    room.host_join(host.conn, Some(created.host_key.clone()), host.tx.clone())
        .await
        .unwrap();
    host
}

async fn join(room: &RoomHandle, id: u64, name: &str) -> (Client, PlayerId, SessionToken) {
    let mut client = Client::new(id);
    let player_id = room
        .join(client.conn, name.into(), None, client.tx.clone())
        .await
        .unwrap();
    let token = match client.next().await {
        ServerEvent::Joined { session_token, .. } => session_token,
        other => panic!("expected joined, got {other:?}"),
    };
    (client, player_id, token)
}

// =========================================================================
// Setup and lobby
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_during_setup_is_rejected() {
    let registry = RoomRegistry::default();
    let created = registry.create_room().await;
    let room = registry.get(&created.code).await.unwrap();

    let client = Client::new(1);
    let result = room.join(client.conn, "Ada".into(), None, client.tx.clone()).await;

    assert!(matches!(result, Err(RoomError::InvalidState(_))));
    let status = registry.status(&created.code).await.unwrap();
    assert_eq!(status.state, RoomPhase::Setup);
}

#[tokio::test(start_paused = true)]
async fn test_load_puzzles_rejects_empty_list_and_second_load() {
    let registry = RoomRegistry::default();
    let created = registry.create_room().await;

    let empty = registry.load_puzzles(&created.code, Vec::new()).await;
    assert!(matches!(empty, Err(RoomError::InvalidInput(_))));

    let puzzles = vec![PuzzleSource::new("a.png", "Big Ben")];
    assert_eq!(registry.load_puzzles(&created.code, puzzles.clone()).await.unwrap(), 1);

    let again = registry.load_puzzles(&created.code, puzzles).await;
    assert!(matches!(again, Err(RoomError::InvalidState(_))));
}

#[tokio::test(start_paused = true)]
async fn test_join_rejects_blank_or_long_names() {
    let (_registry, room, _created) = open_room(&["Big Ben"]).await;
    for name in ["", "   ", "a-name-that-is-way-too-long"] {
        let client = Client::new(1);
        let result = room.join(client.conn, name.into(), None, client.tx.clone()).await;
        assert!(
            matches!(result, Err(RoomError::InvalidInput(_))),
            "{name:?} should be rejected"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_join_acknowledges_and_announces() {
    let (registry, room, created) = open_room(&["Big Ben"]).await;
    let mut host = attach_host(&room, &created).await;
    host.drain();

    let (mut ada, ada_id, token) = join(&room, 1, "  Ada  ").await;
    assert_eq!(token.as_str().len(), 32);
    assert!(matches!(
        ada.next().await,
        ServerEvent::Leaderboard { players } if players.len() == 1 && players[0].name == "Ada"
    ));

    let host_events = host.drain();
    assert!(host_events.contains(&ServerEvent::PlayerJoined {
        player_id: ada_id,
        name: "Ada".into(),
        reconnected: false,
    }));

    let status = registry.status(&created.code).await.unwrap();
    assert_eq!(status.state, RoomPhase::Lobby);
    assert_eq!(status.online_player_count, 1);
    assert_eq!(status.total_rounds, 0);
}

#[tokio::test(start_paused = true)]
async fn test_host_join_requires_key_when_host_present() {
    let (_registry, room, created) = open_room(&["Big Ben"]).await;
    let _host = attach_host(&room, &created).await;

    let intruder = Client::new(7);
    let result = room.host_join(intruder.conn, None, intruder.tx.clone()).await;
    assert!(matches!(result, Err(RoomError::Unauthorized(_))));

    let wrong = room
        .host_join(intruder.conn, Some("nope".into()), intruder.tx.clone())
        .await;
    assert!(matches!(wrong, Err(RoomError::Unauthorized(_))));

    let mut second_screen = Client::new(8);
    room.host_join(
        second_screen.conn,
        Some(created.host_key.clone()),
        second_screen.tx.clone(),
    )
    .await
    .unwrap();
    assert!(matches!(
        second_screen.next().await,
        ServerEvent::HostJoined { puzzle_count: 1, state: RoomPhase::Lobby, .. }
    ));
}

// =========================================================================
// Rounds
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_game_clamps_rounds_and_seconds() {
    let (_registry, room, created) = open_room(&["Eiffel Tower", "Big Ben"]).await;
    let mut host = attach_host(&room, &created).await;
    host.drain();

    room.start_game(host.conn, 99, 1).await.unwrap();

    assert_eq!(
        host.next().await,
        ServerEvent::NewRound {
            round: 1,
            total_rounds: 2,
            image: "img-0.png".into(),
            time_per_round: 5,
            remaining: None,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_game_from_non_host_is_silently_refused() {
    let (_registry, room, created) = open_room(&["Big Ben"]).await;
    let _host = attach_host(&room, &created).await;
    let (player, _, _) = join(&room, 1, "Ada").await;

    let result = room.start_game(player.conn, 1, 30).await;
    let err = result.unwrap_err();
    assert!(matches!(err, RoomError::Unauthorized(_)));
    assert!(!err.is_surfaced());
}

#[tokio::test(start_paused = true)]
async fn test_hints_and_round_end_follow_the_clock() {
    let (_registry, room, created) = open_room(&["Eiffel Tower"]).await;
    let mut host = attach_host(&room, &created).await;
    let _ada = join(&room, 1, "Ada").await;

    room.start_game(host.conn, 1, 30).await.unwrap();
    let start = Instant::now();
    host.drain();

    assert_eq!(
        host.until(is_hint).await,
        ServerEvent::Hint {
            level: 1,
            text: "E_____ T____ (2 words)".into()
        }
    );
    assert_eq!(start.elapsed(), Duration::from_secs(15));

    assert_eq!(
        host.until(is_hint).await,
        ServerEvent::Hint {
            level: 2,
            text: "E_f_e_ T_w_r".into()
        }
    );
    assert_eq!(start.elapsed(), Duration::from_millis(22_500));

    let end = host.until(is_round_end).await;
    assert_eq!(start.elapsed(), Duration::from_secs(30));
    assert!(matches!(
        end,
        ServerEvent::RoundEnd { ref answer, is_last_round: true, .. } if answer == "Eiffel Tower"
    ));

    host.until(|e| matches!(e, ServerEvent::GameOver { .. })).await;
    assert_eq!(start.elapsed(), Duration::from_secs(33));
}

#[tokio::test(start_paused = true)]
async fn test_round_timeout_auto_advances_after_five_seconds() {
    let (_registry, room, created) = open_room(&["Eiffel Tower", "Big Ben"]).await;
    let mut host = attach_host(&room, &created).await;

    room.start_game(host.conn, 2, 10).await.unwrap();
    let start = Instant::now();

    let end = host.until(is_round_end).await;
    assert!(matches!(end, ServerEvent::RoundEnd { is_last_round: false, .. }));

    let next = host.until(|e| matches!(e, ServerEvent::NewRound { .. })).await;
    assert_eq!(start.elapsed(), Duration::from_secs(15));
    assert!(matches!(next, ServerEvent::NewRound { round: 2, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_guess_scores_by_remaining_time() {
    let (_registry, room, created) = open_room(&["The Eiffel Tower"]).await;
    let host = attach_host(&room, &created).await;
    let (mut ada, _, _) = join(&room, 1, "Ada").await;
    let _bob = join(&room, 2, "Bob").await;

    room.start_game(host.conn, 1, 30).await.unwrap();
    tokio::time::advance(Duration::from_secs(9)).await;
    ada.drain();

    room.submit_guess(ada.conn, "eiffel tower".into()).await.unwrap();

    assert_eq!(
        ada.next().await,
        ServerEvent::GuessResult {
            outcome: MatchKind::Correct,
            similarity: 1.0,
            points: 700,
            score: 700,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_wrong_guess_can_retry_partial_counts_once() {
    let (_registry, room, created) = open_room(&["Golden Gate Bridge"]).await;
    let host = attach_host(&room, &created).await;
    let (mut ada, ada_id, _) = join(&room, 1, "Ada").await;
    let (mut bob, _, _) = join(&room, 2, "Bob").await;

    room.start_game(host.conn, 1, 30).await.unwrap();
    ada.drain();
    bob.drain();

    room.submit_guess(ada.conn, "pizza".into()).await.unwrap();
    assert!(matches!(
        ada.next().await,
        ServerEvent::GuessResult { outcome: MatchKind::Wrong, points: 0, score: 0, .. }
    ));
    assert!(bob.drain().is_empty(), "wrong guesses are private");

    room.submit_guess(ada.conn, "golden gatx brixxx".into()).await.unwrap();
    assert!(matches!(
        ada.next().await,
        ServerEvent::GuessResult { outcome: MatchKind::Partial, points: 389, score: 389, .. }
    ));
    assert!(bob.drain().contains(&ServerEvent::PlayerGuessed {
        player_id: ada_id,
        name: "Ada".into(),
    }));
    ada.drain();

    let again = room.submit_guess(ada.conn, "golden gate bridge".into()).await;
    assert!(matches!(again, Err(RoomError::Duplicate(_))));
    assert!(ada.drain().is_empty(), "duplicate guesses get no reply");
}

#[tokio::test(start_paused = true)]
async fn test_guess_outside_round_is_invalid_state() {
    let (_registry, room, _created) = open_room(&["Big Ben"]).await;
    let (ada, _, _) = join(&room, 1, "Ada").await;

    let result = room.submit_guess(ada.conn, "big ben".into()).await;
    assert!(matches!(result, Err(RoomError::InvalidState(_))));

    let stranger = Client::new(9);
    let result = room.submit_guess(stranger.conn, "big ben".into()).await;
    assert!(matches!(result, Err(RoomError::InvalidState(_))));
}

#[tokio::test(start_paused = true)]
async fn test_all_players_answering_ends_round_early() {
    let (_registry, room, created) = open_room(&["Eiffel Tower", "Big Ben"]).await;
    let mut host = attach_host(&room, &created).await;
    let mut players = Vec::new();
    for (id, name) in [(1, "Ada"), (2, "Bob"), (3, "Cy")] {
        players.push(join(&room, id, name).await.0);
    }

    room.start_game(host.conn, 1, 30).await.unwrap();
    let start = Instant::now();
    for player in &players {
        room.submit_guess(player.conn, "eiffel tower".into()).await.unwrap();
    }

    let end = host.until(is_round_end).await;
    assert_eq!(start.elapsed(), Duration::ZERO);
    let ServerEvent::RoundEnd {
        answer,
        leaderboard,
        is_last_round,
    } = end
    else {
        unreachable!()
    };
    assert_eq!(answer, "Eiffel Tower");
    assert!(is_last_round);
    assert_eq!(leaderboard.len(), 3);
    assert!(leaderboard.iter().all(|e| e.score == 1000 && e.guessed_this_round));
    assert_eq!(
        leaderboard.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        ["Ada", "Bob", "Cy"],
        "ties keep join order"
    );

    host.until(|e| matches!(e, ServerEvent::GameOver { .. })).await;
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_last_unanswered_player_leaving_ends_round() {
    let (_registry, room, created) = open_room(&["Eiffel Tower", "Big Ben"]).await;
    let mut host = attach_host(&room, &created).await;
    let (ada, _, _) = join(&room, 1, "Ada").await;
    let (bob, _, _) = join(&room, 2, "Bob").await;

    room.start_game(host.conn, 2, 30).await.unwrap();
    let start = Instant::now();
    room.submit_guess(ada.conn, "eiffel tower".into()).await.unwrap();
    room.disconnect(bob.conn).await.unwrap();

    let end = host.until(is_round_end).await;
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(matches!(end, ServerEvent::RoundEnd { is_last_round: false, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_next_round_cancels_old_timers() {
    let (_registry, room, created) = open_room(&["Eiffel Tower", "Big Ben"]).await;
    let mut host = attach_host(&room, &created).await;

    room.start_game(host.conn, 2, 30).await.unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    room.next_round(host.conn).await.unwrap();
    let round_two = Instant::now();

    let events = host.drain();
    assert!(events.iter().any(|e| matches!(e, ServerEvent::RoundEnd { is_last_round: false, .. })));
    assert!(events.iter().any(|e| matches!(e, ServerEvent::NewRound { round: 2, .. })));

    // Round one's hint would have landed 14 s into round two.
    let hint = host.until(is_hint).await;
    assert_eq!(round_two.elapsed(), Duration::from_secs(15));
    assert_eq!(
        hint,
        ServerEvent::Hint {
            level: 1,
            text: "B__ B__ (2 words)".into()
        }
    );

    let end = host.until(is_round_end).await;
    assert_eq!(round_two.elapsed(), Duration::from_secs(30));
    assert!(matches!(
        end,
        ServerEvent::RoundEnd { ref answer, is_last_round: true, .. } if answer == "Big Ben"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_next_round_on_last_round_finishes_immediately() {
    let (registry, room, created) = open_room(&["Eiffel Tower"]).await;
    let mut host = attach_host(&room, &created).await;

    room.start_game(host.conn, 1, 30).await.unwrap();
    host.drain();
    room.next_round(host.conn).await.unwrap();

    let events = host.drain();
    assert!(matches!(events.first(), Some(ServerEvent::RoundEnd { is_last_round: true, .. })));
    assert!(matches!(events.last(), Some(ServerEvent::GameOver { .. })));

    let after = room.next_round(host.conn).await;
    assert!(matches!(after, Err(RoomError::InvalidState(_))));
    let status = registry.status(&created.code).await.unwrap();
    assert_eq!(status.state, RoomPhase::Finished);
}

// =========================================================================
// Reconnection and host transfer
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_rejoin_with_token_restores_identity_and_score() {
    let (_registry, room, created) = open_room(&["Eiffel Tower", "Big Ben"]).await;
    let host = attach_host(&room, &created).await;
    let (ada, ada_id, token) = join(&room, 1, "Ada").await;
    let _bob = join(&room, 2, "Bob").await;

    room.start_game(host.conn, 2, 30).await.unwrap();
    tokio::time::advance(Duration::from_secs(3)).await;
    room.submit_guess(ada.conn, "eiffel tower".into()).await.unwrap();
    room.disconnect(ada.conn).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let mut back = Client::new(3);
    let rejoined = room
        .join(back.conn, "Ada".into(), Some(token.clone()), back.tx.clone())
        .await
        .unwrap();
    assert_eq!(rejoined, ada_id);

    let events = back.drain();
    assert_eq!(
        events[0],
        ServerEvent::Joined {
            room_code: created.code.clone(),
            player_id: ada_id,
            session_token: token,
            name: "Ada".into(),
            score: 900,
            state: RoomPhase::Playing,
            reconnected: true,
        }
    );
    assert!(events.contains(&ServerEvent::NewRound {
        round: 1,
        total_rounds: 2,
        image: "img-0.png".into(),
        time_per_round: 30,
        remaining: Some(25),
    }));
    assert!(events.contains(&ServerEvent::AlreadyAnswered));

    let again = room.submit_guess(back.conn, "eiffel tower".into()).await;
    assert!(matches!(again, Err(RoomError::Duplicate(_))));
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_mid_round_replays_revealed_hints() {
    let (_registry, room, created) = open_room(&["Eiffel Tower"]).await;
    let mut host = attach_host(&room, &created).await;
    let (ada, _, token) = join(&room, 1, "Ada").await;
    let _bob = join(&room, 2, "Bob").await;

    room.start_game(host.conn, 1, 30).await.unwrap();
    room.disconnect(ada.conn).await.unwrap();
    host.until(is_hint).await;

    let mut back = Client::new(3);
    room.join(back.conn, String::new(), Some(token), back.tx.clone())
        .await
        .unwrap();

    let events = back.drain();
    assert!(matches!(
        &events[0],
        ServerEvent::Joined { name, reconnected: true, .. } if name == "Ada"
    ));
    assert!(events.contains(&ServerEvent::Hint {
        level: 1,
        text: "E_____ T____ (2 words)".into(),
    }));
    assert!(!events.contains(&ServerEvent::AlreadyAnswered));
}

#[tokio::test(start_paused = true)]
async fn test_host_disconnect_promotes_earliest_joined_player() {
    let (_registry, room, created) = open_room(&["Big Ben"]).await;
    let host = attach_host(&room, &created).await;
    let (mut ada, _, _) = join(&room, 1, "Ada").await;
    let (mut bob, _, _) = join(&room, 2, "Bob").await;

    room.disconnect(host.conn).await.unwrap();

    ada.until(|e| matches!(e, ServerEvent::HostPromoted)).await;
    assert!(!bob.drain().contains(&ServerEvent::HostPromoted));

    let refused = room.start_game(bob.conn, 1, 30).await;
    assert!(matches!(refused, Err(RoomError::Unauthorized(_))));
    room.start_game(ada.conn, 1, 30).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_second_join_on_same_connection_retires_first_player() {
    let (registry, room, created) = open_room(&["Eiffel Tower", "Big Ben"]).await;
    let mut host = attach_host(&room, &created).await;
    let (ada, first_id, _) = join(&room, 1, "Ada").await;

    let second_id = room
        .join(ada.conn, "Ada B".into(), None, ada.tx.clone())
        .await
        .unwrap();
    assert_ne!(first_id, second_id);

    let left = host
        .until(|e| matches!(e, ServerEvent::PlayerLeft { .. }))
        .await;
    assert!(matches!(left, ServerEvent::PlayerLeft { player_id, .. } if player_id == first_id));
    let status = registry.status(&created.code).await.unwrap();
    assert_eq!(status.online_player_count, 1);

    // Only the live identity has to answer for the round to close.
    room.start_game(host.conn, 2, 30).await.unwrap();
    let start = Instant::now();
    room.submit_guess(ada.conn, "eiffel tower".into()).await.unwrap();
    host.until(is_round_end).await;
    assert_eq!(start.elapsed(), Duration::ZERO);

    room.disconnect(ada.conn).await.unwrap();
    room.disconnect(host.conn).await.unwrap();
    let status = registry.status(&created.code).await.unwrap();
    assert_eq!(status.online_player_count, 0);

    tokio::time::sleep(Duration::from_secs(601)).await;
    tokio::task::yield_now().await;
    assert!(room.is_closed());
}

// =========================================================================
// Reaping
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_abandoned_room_is_reaped_after_grace() {
    let (registry, room, created) = open_room(&["Big Ben"]).await;
    let host = attach_host(&room, &created).await;
    room.disconnect(host.conn).await.unwrap();

    tokio::time::sleep(Duration::from_secs(599)).await;
    assert!(registry.status(&created.code).await.is_ok());

    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;

    assert!(room.is_closed());
    assert!(matches!(
        registry.get(&created.code).await,
        Err(RoomError::NotFound(_))
    ));
    assert_eq!(registry.sweep().await, vec![created.code.clone()]);
    assert_eq!(registry.room_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_returning_player_cancels_reap() {
    let (registry, room, created) = open_room(&["Big Ben"]).await;
    let (ada, _, token) = join(&room, 1, "Ada").await;
    room.disconnect(ada.conn).await.unwrap();

    tokio::time::sleep(Duration::from_secs(300)).await;
    let back = Client::new(2);
    room.join(back.conn, "Ada".into(), Some(token), back.tx.clone())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(900)).await;
    let status = registry.status(&created.code).await.unwrap();
    assert_eq!(status.online_player_count, 1);
}
