//! Settlement of finished moves.
//!
//! The `Reconciler` decides what a finished transport call does to the store.
//! It consults the [`MutationFence`] first: a completion whose timestamp is no
//! longer the card's latest stamp leaves the store alone.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::events::{BoardEvent, broadcast_event};
use super::fence::MutationFence;
use super::models::{Card, MoveContext, MoveIntent, MoveOutcome};
use super::store::{CardStore, InvalidateOptions};
use crate::errors::TransportError;

/// Settles a finished transport call against the store.
///
/// A completion only touches the store while the fence still names it as the
/// latest move of its card.
#[derive(Clone)]
pub struct Reconciler {
    store: CardStore,
    fence: Arc<MutationFence>,
    events: broadcast::Sender<BoardEvent>,
}

impl Reconciler {
    pub fn new(
        store: CardStore,
        fence: Arc<MutationFence>,
        events: broadcast::Sender<BoardEvent>,
    ) -> Self {
        Self {
            store,
            fence,
            events,
        }
    }

    pub fn settle(
        &self,
        intent: &MoveIntent,
        context: &MoveContext,
        result: Result<&Card, &TransportError>,
    ) -> MoveOutcome {
        let outcome = match result {
            Ok(_) => self.on_success(intent, context),
            Err(e) => {
                tracing::debug!(card_id = %intent.card_id, error = %e, "move failed");
                self.on_error(intent, context)
            }
        };

        tracing::info!(
            card_id = %intent.card_id,
            timestamp = context.timestamp,
            outcome = %outcome,
            "move settled"
        );
        broadcast_event(
            &self.events,
            BoardEvent::MoveSettled {
                card_id: intent.card_id,
                timestamp: context.timestamp,
                outcome,
            },
        );
        outcome
    }

    /// Restore the pre-move lists, unless a newer move owns the card.
    ///
    /// The fence check and the restore share one store transaction, which
    /// also covers every `begin`; a newer move cannot slip in between them.
    pub fn on_error(&self, intent: &MoveIntent, context: &MoveContext) -> MoveOutcome {
        self.store.transact(|txn| {
            if !self.fence.is_current(intent.card_id, context.timestamp) {
                return MoveOutcome::Superseded;
            }
            let Some(previous_source) = &context.previous_source else {
                return MoveOutcome::Untracked;
            };

            txn.set(intent.source_column_id.clone(), previous_source.clone());
            if intent.is_cross_column()
                && let Some(previous_destination) = &context.previous_destination
            {
                txn.set(
                    intent.destination_column_id.clone(),
                    previous_destination.clone(),
                );
            }
            MoveOutcome::RolledBack
        })
    }

    /// Queue background revalidation of the touched columns.
    pub fn on_success(&self, intent: &MoveIntent, context: &MoveContext) -> MoveOutcome {
        if !context.has_snapshot() {
            return MoveOutcome::Untracked;
        }
        self.store.transact(|txn| {
            if !self.fence.is_current(intent.card_id, context.timestamp) {
                return MoveOutcome::Superseded;
            }

            txn.invalidate(&intent.source_column_id, InvalidateOptions::background());
            if intent.is_cross_column() {
                txn.invalidate(
                    &intent.destination_column_id,
                    InvalidateOptions::background(),
                );
            }
            MoveOutcome::Confirmed
        })
    }
}
