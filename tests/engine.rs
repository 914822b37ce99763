//! End-to-end tests of the move engine against the in-memory board.
//!
//! Time is paused, so latencies scripted on the board decide completion
//! order deterministically.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use cardshift::board::memory::{CallPlan, MemoryBoard};
use cardshift::board::ordering::is_dense;
use cardshift::board::{BoardEvent, BoardSession, Card, CardId, ColumnId, MoveIntent, MoveOutcome};
use cardshift::config::CardshiftConfig;

fn todo() -> ColumnId {
    ColumnId::from("todo")
}

fn done() -> ColumnId {
    ColumnId::from("done")
}

fn cards(column: &str, ids: &[i64]) -> Vec<Card> {
    ids.iter()
        .map(|id| Card::new(*id, column, 0, &format!("C{}", id)))
        .collect()
}

fn ids(cards: &[Card]) -> Vec<i64> {
    cards.iter().map(|c| c.id.0).collect()
}

/// Board with todo [C1, C2] and done [C3, C4], both columns cached.
async fn setup_with(board: MemoryBoard) -> (BoardSession, Arc<MemoryBoard>) {
    cardshift::telemetry::init_test_logging();
    let board = Arc::new(board);
    board.put_column(&todo(), cards("todo", &[1, 2]));
    board.put_column(&done(), cards("done", &[3, 4]));

    let session = BoardSession::new(&CardshiftConfig::default(), board.clone(), board.clone());
    session.store().load(&todo()).await.unwrap();
    session.store().load(&done()).await.unwrap();
    (session, board)
}

async fn setup() -> (BoardSession, Arc<MemoryBoard>) {
    setup_with(MemoryBoard::new()).await
}

fn settled(rx: &mut broadcast::Receiver<BoardEvent>) -> Vec<(CardId, MoveOutcome)> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let BoardEvent::MoveSettled {
            card_id, outcome, ..
        } = event
        {
            out.push((card_id, outcome));
        }
    }
    out
}

fn assert_well_formed(session: &BoardSession) {
    let mut seen = HashSet::new();
    for (column, cards) in session.store().snapshot() {
        assert!(is_dense(&cards), "column {} not densely ordered", column);
        for card in &cards {
            assert_eq!(card.column_id, column);
            assert!(seen.insert(card.id), "card {} cached twice", card.id);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_same_column_reorder_is_visible_immediately() {
    let (session, board) = setup().await;
    board.plan(CallPlan::ok_after(500));

    session.submit_immediate(MoveIntent::new(2, "todo", "todo", 0));

    assert_eq!(ids(&session.store().get(&todo()).unwrap()), vec![2, 1]);
    assert_well_formed(&session);
    assert!(board.moves().len() <= 1);
}

#[tokio::test(start_paused = true)]
async fn test_cross_column_failure_restores_both_columns() {
    let (session, board) = setup().await;
    let mut rx = session.subscribe();
    board.plan(CallPlan::fail_after(100));
    let before_todo = session.store().get(&todo()).unwrap();
    let before_done = session.store().get(&done()).unwrap();

    session.submit_immediate(MoveIntent::new(1, "todo", "done", 1));
    assert_eq!(ids(&session.store().get(&todo()).unwrap()), vec![2]);
    assert_eq!(ids(&session.store().get(&done()).unwrap()), vec![3, 1, 4]);
    assert_well_formed(&session);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(session.store().get(&todo()).unwrap(), before_todo);
    assert_eq!(session.store().get(&done()).unwrap(), before_done);
    assert_eq!(settled(&mut rx), vec![(CardId(1), MoveOutcome::RolledBack)]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_moves_sends_one_request_with_last_index() {
    let board = Arc::new(MemoryBoard::new());
    board.put_column(&todo(), cards("todo", &[1, 2, 3, 4]));
    let session = BoardSession::new(&CardshiftConfig::default(), board.clone(), board.clone());
    session.store().load(&todo()).await.unwrap();

    for order in 1..=3 {
        session.submit(MoveIntent::new(1, "todo", "todo", order));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let moves = board.moves();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0], MoveIntent::new(1, "todo", "todo", 3));
    assert_eq!(ids(&session.store().get(&todo()).unwrap()), vec![2, 3, 4, 1]);
    assert!(!session.is_pending(CardId(1)));
}

#[tokio::test(start_paused = true)]
async fn test_late_failure_of_older_move_does_not_roll_back() {
    let (session, board) = setup().await;
    let mut rx = session.subscribe();
    let older = MoveIntent::new(1, "todo", "done", 0);
    let newer = MoveIntent::new(1, "done", "done", 2);
    board.plan_for(older.clone(), CallPlan::fail_after(300));
    board.plan_for(newer.clone(), CallPlan::ok_after(50));

    session.submit_immediate(older);
    let first = session.fence().current(CardId(1)).unwrap();
    session.submit_immediate(newer);
    let second = session.fence().current(CardId(1)).unwrap();
    assert!(second > first);
    assert_eq!(ids(&session.store().get(&done()).unwrap()), vec![3, 4, 1]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let version_todo = session.store().version(&todo());
    let version_done = session.store().version(&done());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(session.store().version(&todo()), version_todo);
    assert_eq!(session.store().version(&done()), version_done);
    assert_eq!(
        settled(&mut rx),
        vec![
            (CardId(1), MoveOutcome::Confirmed),
            (CardId(1), MoveOutcome::Superseded),
        ]
    );
    assert_well_formed(&session);
}

#[tokio::test(start_paused = true)]
async fn test_late_success_of_older_move_schedules_no_refetch() {
    let (session, board) = setup().await;
    let mut rx = session.subscribe();
    let older = MoveIntent::new(2, "todo", "todo", 0);
    let newer = MoveIntent::new(2, "todo", "done", 0);
    board.plan_for(older.clone(), CallPlan::ok_after(300));
    board.plan_for(newer.clone(), CallPlan::fail_after(50));

    session.submit_immediate(older);
    session.submit_immediate(newer);

    // Newer fails first and rolls back to the state it saw: after `older`.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ids(&session.store().get(&todo()).unwrap()), vec![2, 1]);
    let fetches = board.fetch_count(&todo());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(board.fetch_count(&todo()), fetches);
    assert_eq!(
        settled(&mut rx),
        vec![
            (CardId(2), MoveOutcome::RolledBack),
            (CardId(2), MoveOutcome::Superseded),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_success_revalidates_touched_columns() {
    let (session, board) = setup().await;
    assert_eq!(board.fetch_count(&todo()), 1);
    assert_eq!(board.fetch_count(&done()), 1);

    session
        .execute(MoveIntent::new(1, "todo", "done", 2))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(board.fetch_count(&todo()), 2);
    assert_eq!(board.fetch_count(&done()), 2);
    assert!(!session.store().is_stale(&done()));
    assert_eq!(session.store().snapshot(), board.columns());
}

#[tokio::test(start_paused = true)]
async fn test_same_column_success_revalidates_only_that_column() {
    let (session, board) = setup().await;

    session
        .execute(MoveIntent::new(2, "todo", "todo", 0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(board.fetch_count(&todo()), 2);
    assert_eq!(board.fetch_count(&done()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_running_refetch_is_not_restarted_by_another_success() {
    let (session, board) = setup_with(MemoryBoard::with_fetch_latency(Duration::from_millis(100))).await;
    board.plan_for(MoveIntent::new(1, "todo", "todo", 1), CallPlan::ok_after(10));
    board.plan_for(MoveIntent::new(2, "todo", "todo", 1), CallPlan::ok_after(20));

    session.submit_immediate(MoveIntent::new(1, "todo", "todo", 1));
    session.submit_immediate(MoveIntent::new(2, "todo", "todo", 1));

    // First success at 10ms starts a 100ms refetch; second at 20ms finds it running.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(session.store().is_fetching(&todo()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(board.fetch_count(&todo()), 2);
    assert!(!session.store().is_fetching(&todo()));
}

#[tokio::test(start_paused = true)]
async fn test_uncached_column_sends_move_without_feedback() {
    let board = Arc::new(MemoryBoard::new());
    board.put_column(&todo(), cards("todo", &[1, 2]));
    board.put_column(&done(), cards("done", &[3]));
    let session = BoardSession::new(&CardshiftConfig::default(), board.clone(), board.clone());
    session.store().load(&todo()).await.unwrap();
    let mut rx = session.subscribe();

    let moved = session
        .execute(MoveIntent::new(1, "todo", "done", 0))
        .await
        .unwrap();

    assert_eq!(moved.column_id, done());
    assert_eq!(session.store().version(&done()), 0);
    assert_eq!(ids(&session.store().get(&todo()).unwrap()), vec![1, 2]);
    assert_eq!(settled(&mut rx), vec![(CardId(1), MoveOutcome::Untracked)]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_move_of_missing_card_leaves_store_unchanged() {
    let (session, board) = setup().await;
    board.plan(CallPlan::fail_after(0));
    let before = session.store().snapshot();

    let err = session
        .execute(MoveIntent::new(9, "todo", "done", 0))
        .await
        .unwrap_err();

    assert!(err.to_string().contains('9'));
    assert_eq!(session.store().snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn test_moves_of_different_cards_run_independently() {
    let (session, board) = setup().await;
    board.plan_for(MoveIntent::new(1, "todo", "todo", 1), CallPlan::ok_after(40));
    board.plan_for(MoveIntent::new(3, "done", "done", 1), CallPlan::fail_after(20));

    let results = futures::future::join_all([
        session.execute(MoveIntent::new(1, "todo", "todo", 1)),
        session.execute(MoveIntent::new(3, "done", "done", 1)),
    ])
    .await;

    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    // Card 3's rollback does not disturb card 1's column.
    assert_eq!(ids(&session.store().get(&done()).unwrap()), vec![3, 4]);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ids(&session.store().get(&todo()).unwrap()), vec![2, 1]);
    assert_well_formed(&session);
}

#[tokio::test(start_paused = true)]
async fn test_random_walk_keeps_columns_densely_ordered() {
    let (session, board) = setup().await;
    let steps = [
        (1, "todo", "done", 0, false),
        (3, "done", "todo", 5, true),
        (1, "done", "done", 3, false),
        (2, "todo", "todo", 0, true),
        (4, "done", "todo", 1, false),
    ];
    for (i, (card, from, to, order, fail)) in steps.into_iter().enumerate() {
        let intent = MoveIntent::new(card, from, to, order);
        let plan = if fail {
            CallPlan::fail_after(15 * i as u64)
        } else {
            CallPlan::ok_after(15 * i as u64)
        };
        board.plan_for(intent.clone(), plan);
        session.submit_immediate(intent);
        assert_well_formed(&session);
    }

    tokio::time::sleep(Duration::from_millis(500)).await;

    // Rollbacks restore whole snapshots, so only per-column density is
    // guaranteed once completions have interleaved.
    for (column, cards) in session.store().snapshot() {
        assert!(is_dense(&cards), "column {} not densely ordered", column);
    }
    assert_eq!(board.moves().len(), steps.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_submits_keep_every_card() {
    const CARDS: i64 = 8;
    let handle = tokio::runtime::Handle::current();

    for _ in 0..100 {
        let board = Arc::new(MemoryBoard::new());
        board.put_column(&todo(), cards("todo", &(1..=CARDS).collect::<Vec<_>>()));
        board.put_column(&done(), vec![]);
        for _ in 0..CARDS {
            board.plan(CallPlan::ok_after(60_000));
        }
        let session = BoardSession::new(&CardshiftConfig::default(), board.clone(), board.clone());
        session.store().load(&todo()).await.unwrap();
        session.store().load(&done()).await.unwrap();

        let barrier = std::sync::Barrier::new(CARDS as usize);
        std::thread::scope(|scope| {
            for card in 1..=CARDS {
                let (session, barrier, handle) = (&session, &barrier, &handle);
                scope.spawn(move || {
                    let _guard = handle.enter();
                    barrier.wait();
                    session.submit_immediate(MoveIntent::new(card, "todo", "done", 0));
                });
            }
        });

        assert!(session.store().get(&todo()).unwrap().is_empty());
        let mut moved = ids(&session.store().get(&done()).unwrap());
        moved.sort_unstable();
        assert_eq!(moved, (1..=CARDS).collect::<Vec<_>>());
        assert_well_formed(&session);
    }
}
