//! One board view's move engine.
//!
//! A `BoardSession` owns the store, the fence and the debouncer for as long
//! as the view is open. Dropping it aborts pending debounce timers; moves
//! already sent still settle against the store clones held by their tasks.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::coordinator::MoveCoordinator;
use super::debounce::MoveDebouncer;
use super::events::{BoardEvent, EVENT_CHANNEL_CAPACITY};
use super::fence::MutationFence;
use super::highlight::{BroadcastHighlighter, Highlighter};
use super::models::{Card, CardId, MoveIntent};
use super::reconciler::Reconciler;
use super::store::CardStore;
use super::transport::{ColumnFetcher, MoveTransport};
use crate::config::CardshiftConfig;
use crate::errors::MoveError;

pub struct BoardSession {
    store: CardStore,
    fence: Arc<MutationFence>,
    coordinator: MoveCoordinator,
    debouncer: MoveDebouncer,
    events: broadcast::Sender<BoardEvent>,
}

impl BoardSession {
    /// Build a session whose highlights go out on the session's event channel.
    pub fn new(
        config: &CardshiftConfig,
        transport: Arc<dyn MoveTransport>,
        fetcher: Arc<dyn ColumnFetcher>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let highlighter = Arc::new(BroadcastHighlighter::new(events.clone()));
        Self::with_parts(config, transport, fetcher, highlighter, events)
    }

    pub fn with_highlighter(
        config: &CardshiftConfig,
        transport: Arc<dyn MoveTransport>,
        fetcher: Arc<dyn ColumnFetcher>,
        highlighter: Arc<dyn Highlighter>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_parts(config, transport, fetcher, highlighter, events)
    }

    fn with_parts(
        config: &CardshiftConfig,
        transport: Arc<dyn MoveTransport>,
        fetcher: Arc<dyn ColumnFetcher>,
        highlighter: Arc<dyn Highlighter>,
        events: broadcast::Sender<BoardEvent>,
    ) -> Self {
        let store = CardStore::new(fetcher, events.clone());
        let fence = Arc::new(MutationFence::new());
        let reconciler = Reconciler::new(store.clone(), Arc::clone(&fence), events.clone());
        let coordinator = MoveCoordinator::new(
            store.clone(),
            Arc::clone(&fence),
            transport,
            highlighter,
            reconciler,
            config.highlight.clone(),
        );
        let debouncer = MoveDebouncer::new(coordinator.clone(), config.sync.debounce());

        Self {
            store,
            fence,
            coordinator,
            debouncer,
            events,
        }
    }

    /// Debounced move. Returns immediately; observe the outcome via `subscribe`.
    pub fn submit(&self, intent: MoveIntent) {
        self.debouncer.submit(intent);
    }

    /// Undebounced move: the optimistic write has happened when this returns.
    pub fn submit_immediate(&self, intent: MoveIntent) {
        self.debouncer.submit_immediate(intent);
    }

    /// Undebounced move that waits for the server's answer.
    ///
    /// The move runs on its own task: dropping the returned future stops the
    /// wait, not the reconciliation.
    pub async fn execute(&self, intent: MoveIntent) -> Result<Card, MoveError> {
        self.coordinator
            .dispatch(intent)
            .await
            .map_err(|e| MoveError::TaskAborted(e.to_string()))?
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    pub fn fence(&self) -> &MutationFence {
        &self.fence
    }

    pub fn is_pending(&self, card_id: CardId) -> bool {
        self.debouncer.is_pending(card_id)
    }

    /// Number of cards with a debounced move still waiting to be sent.
    pub fn pending_len(&self) -> usize {
        self.debouncer.pending_len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }
}
