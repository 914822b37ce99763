//! Per-card move debouncing.
//!
//! Each card has at most one pending timer. A new submit for the same card
//! aborts the old timer and replaces the stored intent, so only the last
//! intent of a burst reaches the coordinator. Cards never wait on each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

use super::coordinator::MoveCoordinator;
use super::models::{CardId, MoveIntent};

struct PendingMove {
    ticket: u64,
    intent: MoveIntent,
    timer: AbortHandle,
}

type PendingMap = Arc<Mutex<HashMap<CardId, PendingMove>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<CardId, PendingMove>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MoveDebouncer {
    coordinator: MoveCoordinator,
    delay: Duration,
    pending: PendingMap,
    next_ticket: AtomicU64,
}

impl MoveDebouncer {
    pub fn new(coordinator: MoveCoordinator, delay: Duration) -> Self {
        Self {
            coordinator,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `intent` to be sent once its card has been quiet for the
    /// debounce delay. Must be called within a tokio runtime.
    pub fn submit(&self, intent: MoveIntent) {
        let card_id = intent.card_id;
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.remove(&card_id) {
            previous.timer.abort();
            tracing::trace!(%card_id, "coalesced pending move");
        }

        let slots = Arc::clone(&self.pending);
        let coordinator = self.coordinator.clone();
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let intent = {
                let mut slots = lock(&slots);
                match slots.get(&card_id) {
                    Some(slot) if slot.ticket == ticket => slots.remove(&card_id).map(|s| s.intent),
                    _ => None,
                }
            };
            let Some(intent) = intent else {
                return;
            };
            if let Err(e) = coordinator.execute(intent).await {
                tracing::warn!(%card_id, error = %e, "move failed");
            }
        });

        pending.insert(
            card_id,
            PendingMove {
                ticket,
                intent,
                timer: timer.abort_handle(),
            },
        );
    }

    /// Send `intent` now. Any debounced intent still waiting for the same
    /// card is dropped, since this one is newer.
    pub fn submit_immediate(&self, intent: MoveIntent) {
        if let Some(previous) = lock(&self.pending).remove(&intent.card_id) {
            previous.timer.abort();
            tracing::trace!(card_id = %intent.card_id, "immediate move replaced pending move");
        }
        // Optimistic phase runs here; the transport call finishes in the background.
        drop(self.coordinator.dispatch(intent));
    }

    pub fn is_pending(&self, card_id: CardId) -> bool {
        lock(&self.pending).contains_key(&card_id)
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// The intent currently waiting for `card_id`, if any.
    pub fn pending_intent(&self, card_id: CardId) -> Option<MoveIntent> {
        lock(&self.pending).get(&card_id).map(|p| p.intent.clone())
    }

    /// Abort every pending timer without sending anything.
    pub fn cancel_all(&self) {
        for (_, pending) in lock(&self.pending).drain() {
            pending.timer.abort();
        }
    }
}

impl Drop for MoveDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
