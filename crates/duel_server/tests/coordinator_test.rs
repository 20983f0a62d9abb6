//! Tests for event routing, broadcast, and cleanup in the coordinator.

use duel_server::{
    ClientEvent, ConnectionId, Coordinator, Mark, MoveOutcome, ServerEvent, SessionError, SessionId,
    SessionRegistry, SessionStatus,
};
use duel_tictactoe::CELLS;
use std::sync::Arc;
use tokio::sync::Barrier;
use tokio::sync::mpsc::Receiver;

fn coordinator() -> Coordinator {
    Coordinator::new(SessionRegistry::new(), 64)
}

/// Collects everything queued for a connection so far.
fn drain(rx: &mut Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

struct Table {
    coordinator: Coordinator,
    id: SessionId,
    x: ConnectionId,
    o: ConnectionId,
    x_rx: Receiver<ServerEvent>,
    o_rx: Receiver<ServerEvent>,
}

/// Two connections with a game in progress and empty queues.
async fn table() -> Table {
    let coordinator = coordinator();
    let (x, mut x_rx) = coordinator.register();
    let (o, mut o_rx) = coordinator.register();
    let id = coordinator.on_create(x).await.expect("create");
    coordinator.on_join(o, &id).await.expect("join");
    drain(&mut x_rx);
    drain(&mut o_rx);
    Table {
        coordinator,
        id,
        x,
        o,
        x_rx,
        o_rx,
    }
}

#[tokio::test]
async fn test_create_then_join() {
    let coordinator = coordinator();
    let (x, mut x_rx) = coordinator.register();
    let (o, mut o_rx) = coordinator.register();

    let id = coordinator.on_create(x).await.unwrap();
    assert_eq!(
        drain(&mut x_rx),
        vec![ServerEvent::GameCreated {
            game_id: id.clone(),
            symbol: Mark::X
        }]
    );
    {
        let session = coordinator.registry().get(&id).unwrap();
        let session = session.lock().await;
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert_eq!(session.participant_count(), 1);
    }

    assert_eq!(coordinator.on_join(o, &id).await, Ok(Mark::O));
    assert_eq!(drain(&mut x_rx), vec![ServerEvent::OpponentJoined]);
    assert_eq!(
        drain(&mut o_rx),
        vec![
            ServerEvent::GameJoined {
                game_id: id.clone(),
                symbol: Mark::O
            },
            ServerEvent::OpponentJoined,
        ]
    );

    let session = coordinator.registry().get(&id).unwrap();
    assert_eq!(session.lock().await.status(), SessionStatus::Playing);
    assert_eq!(coordinator.session_of(o), Some(id));
}

#[tokio::test]
async fn test_join_unknown_session() {
    let coordinator = coordinator();
    let (o, _rx) = coordinator.register();
    assert_eq!(
        coordinator.on_join(o, &SessionId::from("zzzzz")).await,
        Err(SessionError::SessionNotFound)
    );
}

#[tokio::test]
async fn test_third_player_rejected() {
    let mut t = table().await;
    let (third, mut third_rx) = t.coordinator.register();

    t.coordinator
        .handle(third, ClientEvent::JoinGame { game_id: t.id.clone() })
        .await;

    assert_eq!(
        drain(&mut third_rx),
        vec![ServerEvent::rejected(SessionError::SessionFull)]
    );
    assert!(drain(&mut t.x_rx).is_empty());
    assert!(drain(&mut t.o_rx).is_empty());
}

#[tokio::test]
async fn test_rejoining_own_session_rejected() {
    let coordinator = coordinator();
    let (x, _rx) = coordinator.register();
    let id = coordinator.on_create(x).await.unwrap();
    assert_eq!(
        coordinator.on_join(x, &id).await,
        Err(SessionError::AlreadyJoined)
    );
    assert!(coordinator.registry().get(&id).is_some());
}

#[tokio::test]
async fn test_top_row_win_broadcasts_board_then_result() {
    let mut t = table().await;
    for (handle, index) in [(t.x, 0), (t.o, 3), (t.x, 1), (t.o, 4)] {
        t.coordinator.on_move(handle, &t.id, index, None).await.unwrap();
    }
    drain(&mut t.x_rx);
    drain(&mut t.o_rx);

    let outcome = t.coordinator.on_move(t.x, &t.id, 2, None).await;
    assert_eq!(outcome, Ok(MoveOutcome::Won { winner: Mark::X }));

    for rx in [&mut t.x_rx, &mut t.o_rx] {
        let events = drain(rx);
        assert_eq!(events.len(), 2);
        match &events[0] {
            ServerEvent::BoardUpdated {
                board,
                current_player,
            } => {
                assert_eq!(board.winner(), Some(Mark::X));
                assert_eq!(*current_player, Mark::X);
            }
            other => panic!("expected board-updated, got {other:?}"),
        }
        assert_eq!(events[1], ServerEvent::GameWon { winner: Mark::X });
    }
}

#[tokio::test]
async fn test_full_board_is_a_draw() {
    let mut t = table().await;
    let moves = [
        (t.x, 0),
        (t.o, 1),
        (t.x, 2),
        (t.o, 4),
        (t.x, 3),
        (t.o, 5),
        (t.x, 7),
        (t.o, 6),
        (t.x, 8),
    ];
    for (handle, index) in moves {
        t.coordinator.on_move(handle, &t.id, index, None).await.unwrap();
    }

    let events = drain(&mut t.o_rx);
    assert_eq!(events.last(), Some(&ServerEvent::GameDraw));
    assert_eq!(events.len(), 10);
    drain(&mut t.x_rx);

    assert_eq!(
        t.coordinator.on_move(t.o, &t.id, 0, None).await,
        Err(SessionError::GameNotActive)
    );
}

#[tokio::test]
async fn test_turn_alternates_and_updates_carry_next_player() {
    let mut t = table().await;

    t.coordinator.on_move(t.x, &t.id, 4, None).await.unwrap();
    match drain(&mut t.o_rx).as_slice() {
        [ServerEvent::BoardUpdated { current_player, .. }] => assert_eq!(*current_player, Mark::O),
        other => panic!("unexpected events {other:?}"),
    }

    assert_eq!(
        t.coordinator.on_move(t.x, &t.id, 0, None).await,
        Err(SessionError::NotYourTurn)
    );
    assert_eq!(
        t.coordinator.on_move(t.o, &t.id, 4, None).await,
        Err(SessionError::CellOccupied)
    );
    assert_eq!(
        t.coordinator.on_move(t.o, &t.id, 9, None).await,
        Err(SessionError::InvalidIndex)
    );
    assert!(drain(&mut t.x_rx).len() == 1);
}

#[tokio::test]
async fn test_claimed_symbol_is_ignored() {
    let t = table().await;
    // O claims to be X on X's turn; the server goes by the seat.
    assert_eq!(
        t.coordinator.on_move(t.o, &t.id, 0, Some(Mark::X)).await,
        Err(SessionError::NotYourTurn)
    );
    let session = t.coordinator.registry().get(&t.id).unwrap();
    assert!(session.lock().await.board().is_empty(0));
}

#[tokio::test]
async fn test_move_in_waiting_session_not_active() {
    let coordinator = coordinator();
    let (x, mut x_rx) = coordinator.register();
    let id = coordinator.on_create(x).await.unwrap();
    drain(&mut x_rx);

    coordinator
        .handle(
            x,
            ClientEvent::MakeMove {
                game_id: id,
                index: 0,
                symbol: Some(Mark::X),
            },
        )
        .await;

    assert_eq!(
        drain(&mut x_rx),
        vec![ServerEvent::rejected(SessionError::GameNotActive)]
    );
}

#[tokio::test]
async fn test_reset_after_win() {
    let mut t = table().await;
    for (handle, index) in [(t.x, 0), (t.o, 3), (t.x, 1), (t.o, 4), (t.x, 2)] {
        t.coordinator.on_move(handle, &t.id, index, None).await.unwrap();
    }
    drain(&mut t.x_rx);
    drain(&mut t.o_rx);

    t.coordinator.on_reset(t.o, &t.id).await.unwrap();
    assert_eq!(drain(&mut t.x_rx), vec![ServerEvent::GameReset]);
    assert_eq!(drain(&mut t.o_rx), vec![ServerEvent::GameReset]);

    let session = t.coordinator.registry().get(&t.id).unwrap();
    let session = session.lock().await;
    assert_eq!(session.status(), SessionStatus::Playing);
    assert_eq!(session.turn(), Mark::X);
    assert_eq!(session.outcome(), None);
    assert_eq!(session.board().occupied(), 0);
}

#[tokio::test]
async fn test_reset_while_waiting_rejected() {
    let coordinator = coordinator();
    let (x, _rx) = coordinator.register();
    let id = coordinator.on_create(x).await.unwrap();
    assert_eq!(
        coordinator.on_reset(x, &id).await,
        Err(SessionError::GameNotActive)
    );
}

#[tokio::test]
async fn test_disconnect_of_sole_participant_deletes_session() {
    let coordinator = coordinator();
    let (x, _x_rx) = coordinator.register();
    let (o, _o_rx) = coordinator.register();
    let id = coordinator.on_create(x).await.unwrap();

    coordinator.on_disconnect(x).await;

    assert!(coordinator.registry().get(&id).is_none());
    assert_eq!(
        coordinator.on_join(o, &id).await,
        Err(SessionError::SessionNotFound)
    );
    assert_eq!(coordinator.connection_count(), 1);
}

#[tokio::test]
async fn test_disconnect_leaves_other_waiting_sessions_alone() {
    let coordinator = coordinator();
    let (a, _a_rx) = coordinator.register();
    let (b, _b_rx) = coordinator.register();
    let first = coordinator.on_create(a).await.unwrap();
    let second = coordinator.on_create(b).await.unwrap();

    coordinator.on_disconnect(a).await;

    assert!(coordinator.registry().get(&first).is_none());
    assert!(coordinator.registry().get(&second).is_some());
}

#[tokio::test]
async fn test_opponent_disconnect_notifies_and_last_one_out_deletes() {
    let mut t = table().await;

    t.coordinator.on_disconnect(t.x).await;
    assert_eq!(drain(&mut t.o_rx), vec![ServerEvent::OpponentLeft]);
    assert!(t.coordinator.registry().get(&t.id).is_some());

    t.coordinator.on_disconnect(t.o).await;
    assert!(t.coordinator.registry().get(&t.id).is_none());
    assert!(t.coordinator.registry().is_empty());
}

#[tokio::test]
async fn test_creating_again_leaves_previous_session() {
    let coordinator = coordinator();
    let (x, _rx) = coordinator.register();
    let first = coordinator.on_create(x).await.unwrap();
    let second = coordinator.on_create(x).await.unwrap();

    assert_ne!(first, second);
    assert!(coordinator.registry().get(&first).is_none());
    assert_eq!(coordinator.session_of(x), Some(second));
}

#[tokio::test]
async fn test_failed_join_keeps_current_seat() {
    let t = table().await;
    let (other, _rx) = t.coordinator.register();
    let mine = t.coordinator.on_create(other).await.unwrap();

    assert_eq!(
        t.coordinator.on_join(other, &t.id).await,
        Err(SessionError::SessionFull)
    );
    assert_eq!(t.coordinator.session_of(other), Some(mine.clone()));
    assert!(t.coordinator.registry().get(&mine).is_some());
}

#[tokio::test]
async fn test_sweep_keeps_live_sessions() {
    let t = table().await;
    let (lonely, _rx) = t.coordinator.register();
    t.coordinator.on_create(lonely).await.unwrap();

    assert_eq!(t.coordinator.sweep().await, 0);
    assert_eq!(t.coordinator.registry().len(), 2);
}

#[tokio::test]
async fn test_sweep_removes_sessions_without_live_connections() {
    let coordinator = coordinator();
    let registry = coordinator.registry().clone();
    // Created behind the coordinator's back: its creator is not connected.
    let (id, _) = registry.create(ConnectionId::new()).unwrap();

    assert_eq!(coordinator.sweep().await, 1);
    assert!(registry.get(&id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_accept_exactly_one() {
    for _ in 0..200 {
        let t = table().await;
        let coordinator = Arc::new(t.coordinator);
        let barrier = Arc::new(Barrier::new(CELLS));

        let tasks: Vec<_> = (0..CELLS)
            .map(|index| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                let id = t.id.clone();
                let x = t.x;
                tokio::spawn(async move {
                    barrier.wait().await;
                    coordinator.on_move(x, &id, index, None).await
                })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert_eq!(err, SessionError::NotYourTurn),
            }
        }
        assert_eq!(accepted, 1);

        let session = coordinator.registry().get(&t.id).unwrap();
        let session = session.lock().await;
        assert_eq!(session.board().occupied(), 1);
        assert_eq!(session.turn(), Mark::O);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_joiners_keep_their_seats() {
    for _ in 0..200 {
        let coordinator = Arc::new(coordinator());
        let (host, _host_rx) = coordinator.register();
        let target = coordinator.on_create(host).await.unwrap();

        let (a, _a_rx) = coordinator.register();
        let (b, _b_rx) = coordinator.register();
        let a_home = coordinator.on_create(a).await.unwrap();
        let b_home = coordinator.on_create(b).await.unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let tasks: Vec<_> = [a, b]
            .into_iter()
            .map(|handle| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                let target = target.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    coordinator.on_join(handle, &target).await
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

        for ((handle, home), result) in [(a, a_home), (b, b_home)].into_iter().zip(results) {
            match result {
                Ok(mark) => {
                    assert_eq!(mark, Mark::O);
                    assert_eq!(coordinator.session_of(handle), Some(target.clone()));
                    assert!(coordinator.registry().get(&home).is_none());
                }
                Err(err) => {
                    assert_eq!(err, SessionError::SessionFull);
                    assert_eq!(coordinator.session_of(handle), Some(home.clone()));
                    let session = coordinator.registry().get(&home).expect("seat kept");
                    assert_eq!(session.lock().await.subscribers(), vec![handle]);
                }
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cross_joins_do_not_deadlock() {
    for _ in 0..200 {
        let coordinator = Arc::new(coordinator());
        let (a, _a_rx) = coordinator.register();
        let (b, _b_rx) = coordinator.register();
        let a_home = coordinator.on_create(a).await.unwrap();
        let b_home = coordinator.on_create(b).await.unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let tasks: Vec<_> = [(a, b_home), (b, a_home)]
            .into_iter()
            .map(|(handle, other)| {
                let coordinator = Arc::clone(&coordinator);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    coordinator.on_join(handle, &other).await
                })
            })
            .collect();

        let joined = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut joined = 0;
            for task in tasks {
                if task.await.unwrap().is_ok() {
                    joined += 1;
                }
            }
            joined
        })
        .await
        .expect("joins finish");

        // Whoever moves first abandons its own session, so the other join fails.
        assert_eq!(joined, 1);
        assert_eq!(coordinator.registry().len(), 1);
    }
}
