//! Optimistic move coordinator.
//!
//! `begin` performs the whole optimistic phase synchronously: stamp the
//! fence, stop background refetches that could overwrite the write, reorder
//! the cached lists and write them back. Only then is the transport called,
//! and its completion handed to the [`Reconciler`].

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::fence::MutationFence;
use super::highlight::{HighlightOptions, Highlighter};
use super::models::{Card, MoveContext, MoveIntent, MoveOutcome};
use super::ordering;
use super::reconciler::Reconciler;
use super::store::CardStore;
use super::transport::MoveTransport;
use crate::config::HighlightConfig;
use crate::errors::MoveError;

#[derive(Clone)]
pub struct MoveCoordinator {
    store: CardStore,
    fence: Arc<MutationFence>,
    transport: Arc<dyn MoveTransport>,
    highlighter: Arc<dyn Highlighter>,
    reconciler: Reconciler,
    highlight: HighlightConfig,
}

impl MoveCoordinator {
    pub fn new(
        store: CardStore,
        fence: Arc<MutationFence>,
        transport: Arc<dyn MoveTransport>,
        highlighter: Arc<dyn Highlighter>,
        reconciler: Reconciler,
        highlight: HighlightConfig,
    ) -> Self {
        Self {
            store,
            fence,
            transport,
            highlighter,
            reconciler,
            highlight,
        }
    }

    /// Optimistic phase of a move. Never blocks on the network.
    ///
    /// Returns an untracked context when either column is not cached or the
    /// card is not in the source list; the move is still sent, only the
    /// instant feedback is lost.
    ///
    /// The fence stamp, the snapshot and the write-back happen in one store
    /// transaction, so concurrent moves and settlements never see a
    /// half-applied move.
    pub fn begin(&self, intent: &MoveIntent) -> MoveContext {
        let cross_column = intent.is_cross_column();
        let context = self.store.transact(|txn| {
            let timestamp = self.fence.stamp(intent.card_id);

            txn.cancel_in_flight(&intent.source_column_id);
            if cross_column {
                txn.cancel_in_flight(&intent.destination_column_id);
            }

            let Some(previous_source) = txn.get(&intent.source_column_id) else {
                tracing::debug!(
                    card_id = %intent.card_id,
                    column = %intent.source_column_id,
                    "source column not cached, skipping optimistic update"
                );
                return MoveContext::untracked(timestamp);
            };
            let previous_destination = if cross_column {
                match txn.get(&intent.destination_column_id) {
                    Some(cards) => Some(cards),
                    None => {
                        tracing::debug!(
                            card_id = %intent.card_id,
                            column = %intent.destination_column_id,
                            "destination column not cached, skipping optimistic update"
                        );
                        return MoveContext::untracked(timestamp);
                    }
                }
            } else {
                None
            };

            let reordered = match &previous_destination {
                Some(destination) => ordering::move_across(
                    &previous_source,
                    destination,
                    intent.card_id,
                    &intent.destination_column_id,
                    intent.new_order,
                ),
                None => ordering::reorder_within(&previous_source, intent.card_id, intent.new_order)
                    .map(|source| ordering::Reordered {
                        source,
                        destination: None,
                    }),
            };
            let Some(reordered) = reordered else {
                tracing::debug!(
                    card_id = %intent.card_id,
                    column = %intent.source_column_id,
                    "card not found in source column, skipping optimistic update"
                );
                return MoveContext::untracked(timestamp);
            };

            txn.set(intent.source_column_id.clone(), reordered.source);
            if let Some(destination) = reordered.destination {
                txn.set(intent.destination_column_id.clone(), destination);
            }

            MoveContext {
                previous_source: Some(previous_source),
                previous_destination,
                timestamp,
            }
        });

        if !context.has_snapshot() {
            return context;
        }

        if self.highlight.enabled {
            self.highlighter.highlight(
                intent.card_id,
                HighlightOptions {
                    cross_column,
                    color: self.highlight.color_for(cross_column),
                },
            );
        }

        tracing::debug!(
            card_id = %intent.card_id,
            from = %intent.source_column_id,
            to = %intent.destination_column_id,
            new_order = intent.new_order,
            timestamp = context.timestamp,
            "optimistic move applied"
        );
        context
    }

    /// Send the move and settle its completion.
    async fn complete(
        &self,
        intent: MoveIntent,
        context: MoveContext,
    ) -> (Result<Card, MoveError>, MoveOutcome) {
        let result = self.transport.move_card(&intent).await;
        let outcome = self.reconciler.settle(&intent, &context, result.as_ref());
        let result = result.map_err(|source| MoveError::Transport {
            card_id: intent.card_id.0,
            source,
        });
        (result, outcome)
    }

    /// Run a move to completion and return the transport's answer.
    ///
    /// The store is already consistent with the outcome when this returns,
    /// whether or not the caller looks at the error.
    pub async fn execute(&self, intent: MoveIntent) -> Result<Card, MoveError> {
        let context = self.begin(&intent);
        self.complete(intent, context).await.0
    }

    /// Apply the optimistic phase now and finish the move in a background task.
    pub fn dispatch(&self, intent: MoveIntent) -> JoinHandle<Result<Card, MoveError>> {
        let context = self.begin(&intent);
        let this = self.clone();
        tokio::spawn(async move {
            let card_id = intent.card_id;
            let (result, _) = this.complete(intent, context).await;
            if let Err(e) = &result {
                tracing::warn!(%card_id, error = %e, "move failed");
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use super::*;
    use crate::board::events::BoardEvent;
    use crate::board::highlight::{BroadcastHighlighter, NoopHighlighter};
    use crate::board::models::{CardId, ColumnId};
    use crate::board::transport::ColumnFetcher;
    use crate::errors::TransportError;

    struct PendingFetcher;

    #[async_trait]
    impl ColumnFetcher for PendingFetcher {
        async fn fetch_column(&self, _column: &ColumnId) -> Result<Vec<Card>, TransportError> {
            std::future::pending().await
        }
    }

    /// Answers every move immediately, succeeding or failing as configured.
    struct InstantTransport {
        fail: bool,
        calls: Mutex<Vec<MoveIntent>>,
    }

    #[async_trait]
    impl MoveTransport for InstantTransport {
        async fn move_card(&self, input: &MoveIntent) -> Result<Card, TransportError> {
            self.calls.lock().unwrap().push(input.clone());
            if self.fail {
                return Err(TransportError::Rejected("server said no".into()));
            }
            Ok(Card::new(
                input.card_id.0,
                input.destination_column_id.as_str(),
                input.new_order,
                "moved",
            ))
        }
    }

    struct Harness {
        coordinator: MoveCoordinator,
        store: CardStore,
        transport: Arc<InstantTransport>,
        events: broadcast::Receiver<BoardEvent>,
    }

    fn harness(fail: bool) -> Harness {
        let (tx, events) = broadcast::channel(64);
        let store = CardStore::new(Arc::new(PendingFetcher), tx.clone());
        let fence = Arc::new(MutationFence::new());
        let transport = Arc::new(InstantTransport {
            fail,
            calls: Mutex::new(Vec::new()),
        });
        let reconciler = Reconciler::new(store.clone(), fence.clone(), tx.clone());
        let coordinator = MoveCoordinator::new(
            store.clone(),
            fence,
            transport.clone(),
            Arc::new(BroadcastHighlighter::new(tx)),
            reconciler,
            HighlightConfig::default(),
        );
        Harness {
            coordinator,
            store,
            transport,
            events,
        }
    }

    fn cards(column: &str, ids: &[i64]) -> Vec<Card> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Card::new(*id, column, i, &format!("C{}", id)))
            .collect()
    }

    fn ids(cards: &[Card]) -> Vec<i64> {
        cards.iter().map(|c| c.id.0).collect()
    }

    #[tokio::test]
    async fn test_begin_same_column_reorders_and_snapshots() {
        let h = harness(false);
        let todo = ColumnId::from("todo");
        h.store.set(todo.clone(), cards("todo", &[1, 2, 3]));

        let ctx = h.coordinator.begin(&MoveIntent::new(2, "todo", "todo", 0));

        let now = h.store.get(&todo).unwrap();
        assert_eq!(ids(&now), vec![2, 1, 3]);
        assert!(ordering::is_dense(&now));
        assert_eq!(ctx.previous_source, Some(cards("todo", &[1, 2, 3])));
        assert_eq!(ctx.previous_destination, None);
    }

    #[tokio::test]
    async fn test_begin_cross_column_writes_both_lists() {
        let h = harness(false);
        h.store.set(ColumnId::from("todo"), cards("todo", &[1, 2]));
        h.store.set(ColumnId::from("done"), cards("done", &[3, 4]));

        let ctx = h.coordinator.begin(&MoveIntent::new(1, "todo", "done", 1));

        let todo = h.store.get(&ColumnId::from("todo")).unwrap();
        let done = h.store.get(&ColumnId::from("done")).unwrap();
        assert_eq!(ids(&todo), vec![2]);
        assert_eq!(ids(&done), vec![3, 1, 4]);
        assert_eq!(done[1].column_id, ColumnId::from("done"));
        assert_eq!(ctx.previous_destination, Some(cards("done", &[3, 4])));
    }

    #[tokio::test]
    async fn test_begin_cache_miss_is_untracked_and_writes_nothing() {
        let h = harness(false);
        h.store.set(ColumnId::from("todo"), cards("todo", &[1]));

        let ctx = h.coordinator.begin(&MoveIntent::new(1, "todo", "done", 0));

        assert!(!ctx.has_snapshot());
        assert_eq!(h.store.version(&ColumnId::from("todo")), 1);
    }

    #[tokio::test]
    async fn test_begin_unknown_card_is_untracked() {
        let h = harness(false);
        h.store.set(ColumnId::from("todo"), cards("todo", &[1, 2]));

        let ctx = h.coordinator.begin(&MoveIntent::new(9, "todo", "todo", 0));

        assert!(!ctx.has_snapshot());
        assert_eq!(h.store.get(&ColumnId::from("todo")).unwrap(), cards("todo", &[1, 2]));
    }

    #[tokio::test]
    async fn test_begin_cancels_running_refetch() {
        let h = harness(false);
        let todo = ColumnId::from("todo");
        h.store.set(todo.clone(), cards("todo", &[1, 2]));
        h.store
            .invalidate(&todo, crate::board::store::InvalidateOptions::background());
        assert!(h.store.is_fetching(&todo));

        h.coordinator.begin(&MoveIntent::new(2, "todo", "todo", 0));

        assert!(!h.store.is_fetching(&todo));
    }

    #[tokio::test]
    async fn test_begin_highlights_moved_card() {
        let mut h = harness(false);
        h.store.set(ColumnId::from("todo"), cards("todo", &[1]));
        h.store.set(ColumnId::from("done"), vec![]);
        while h.events.try_recv().is_ok() {}

        h.coordinator.begin(&MoveIntent::new(1, "todo", "done", 0));

        let mut highlighted = None;
        while let Ok(event) = h.events.try_recv() {
            if let BoardEvent::CardHighlighted {
                card_id,
                cross_column,
                ..
            } = event
            {
                highlighted = Some((card_id, cross_column));
            }
        }
        assert_eq!(highlighted, Some((CardId(1), true)));
    }

    #[tokio::test]
    async fn test_execute_failure_rolls_back_and_returns_error() {
        let h = harness(true);
        h.store.set(ColumnId::from("todo"), cards("todo", &[1, 2]));
        h.store.set(ColumnId::from("done"), cards("done", &[3, 4]));

        let err = h
            .coordinator
            .execute(MoveIntent::new(1, "todo", "done", 1))
            .await
            .unwrap_err();

        assert!(matches!(err.transport(), Some(TransportError::Rejected(_))));
        assert_eq!(h.store.get(&ColumnId::from("todo")).unwrap(), cards("todo", &[1, 2]));
        assert_eq!(h.store.get(&ColumnId::from("done")).unwrap(), cards("done", &[3, 4]));
    }

    #[tokio::test]
    async fn test_execute_cache_miss_still_sends() {
        let h = harness(false);

        let card = h
            .coordinator
            .execute(MoveIntent::new(5, "todo", "done", 0))
            .await
            .unwrap();

        assert_eq!(card.id, CardId(5));
        assert_eq!(h.transport.calls.lock().unwrap().len(), 1);
        assert!(!h.store.is_stale(&ColumnId::from("todo")));
    }

    #[tokio::test]
    async fn test_dispatch_applies_optimistic_state_before_spawn_runs() {
        let h = harness(false);
        let todo = ColumnId::from("todo");
        h.store.set(todo.clone(), cards("todo", &[1, 2, 3]));

        let handle = h.coordinator.dispatch(MoveIntent::new(3, "todo", "todo", 0));
        assert_eq!(ids(&h.store.get(&todo).unwrap()), vec![3, 1, 2]);
        assert!(h.transport.calls.lock().unwrap().is_empty());

        handle.await.unwrap().unwrap();
        assert_eq!(h.transport.calls.lock().unwrap().len(), 1);
        assert!(h.store.is_stale(&todo));
    }

    #[test]
    fn test_rollback_and_newer_move_never_interleave() {
        let first = MoveIntent::new(1, "todo", "done", 0);
        let second = MoveIntent::new(1, "done", "done", 2);

        for _ in 0..500 {
            let h = harness(true);
            h.store.set(ColumnId::from("todo"), cards("todo", &[1, 2]));
            h.store.set(ColumnId::from("done"), cards("done", &[3, 4]));
            let first_ctx = h.coordinator.begin(&first);
            let barrier = std::sync::Barrier::new(2);

            let (outcome, second_ctx) = std::thread::scope(|scope| {
                let rollback = scope.spawn(|| {
                    barrier.wait();
                    h.coordinator.reconciler.on_error(&first, &first_ctx)
                });
                let newer = scope.spawn(|| {
                    barrier.wait();
                    h.coordinator.begin(&second)
                });
                (rollback.join().unwrap(), newer.join().unwrap())
            });

            let todo = ids(&h.store.get(&ColumnId::from("todo")).unwrap());
            let done = ids(&h.store.get(&ColumnId::from("done")).unwrap());
            match outcome {
                MoveOutcome::Superseded => {
                    assert!(second_ctx.has_snapshot());
                    assert_eq!((todo, done), (vec![2], vec![3, 4, 1]));
                }
                MoveOutcome::RolledBack => {
                    assert!(!second_ctx.has_snapshot());
                    assert_eq!((todo, done), (vec![1, 2], vec![3, 4]));
                }
                other => panic!("unexpected outcome {other}"),
            }
        }
    }

    #[tokio::test]
    async fn test_disabled_highlight_publishes_nothing() {
        let (tx, mut rx) = broadcast::channel(64);
        let store = CardStore::new(Arc::new(PendingFetcher), tx.clone());
        let fence = Arc::new(MutationFence::new());
        let reconciler = Reconciler::new(store.clone(), fence.clone(), tx.clone());
        let coordinator = MoveCoordinator::new(
            store.clone(),
            fence,
            Arc::new(InstantTransport {
                fail: false,
                calls: Mutex::new(Vec::new()),
            }),
            Arc::new(NoopHighlighter),
            reconciler,
            HighlightConfig {
                enabled: false,
                ..HighlightConfig::default()
            },
        );
        store.set(ColumnId::from("todo"), cards("todo", &[1, 2]));

        coordinator.begin(&MoveIntent::new(1, "todo", "todo", 1));

        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, BoardEvent::CardHighlighted { .. }));
        }
    }
}
