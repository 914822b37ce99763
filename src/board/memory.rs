//! In-memory board backend.
//!
//! Stands in for the board server: it keeps authoritative column lists,
//! applies moves when a call *completes*, and can be told how long each call
//! takes and whether it fails. Scripting latencies is how out-of-order
//! completions are reproduced deterministically.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::models::{Card, ColumnId, MoveIntent};
use super::ordering;
use super::transport::{ColumnFetcher, MoveTransport};
use crate::errors::TransportError;

/// How the next transport call behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallPlan {
    pub latency: Duration,
    pub fail: bool,
}

impl CallPlan {
    pub fn ok_after(ms: u64) -> Self {
        Self {
            latency: Duration::from_millis(ms),
            fail: false,
        }
    }

    pub fn fail_after(ms: u64) -> Self {
        Self {
            latency: Duration::from_millis(ms),
            fail: true,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    columns: BTreeMap<ColumnId, Vec<Card>>,
    plans: VecDeque<CallPlan>,
    intent_plans: HashMap<MoveIntent, VecDeque<CallPlan>>,
    moves: Vec<MoveIntent>,
    fetches: Vec<ColumnId>,
}

#[derive(Default)]
pub struct MemoryBoard {
    state: Mutex<MemoryState>,
    fetch_latency: Duration,
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetch_latency(latency: Duration) -> Self {
        Self {
            fetch_latency: latency,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a column. Cards are re-homed and renumbered.
    pub fn put_column(&self, column: &ColumnId, mut cards: Vec<Card>) {
        for card in cards.iter_mut() {
            card.column_id = column.clone();
        }
        ordering::renumber(&mut cards);
        self.lock().columns.insert(column.clone(), cards);
    }

    /// Queue the behaviour of the next move call that has no
    /// intent-specific plan.
    pub fn plan(&self, plan: CallPlan) {
        self.lock().plans.push_back(plan);
    }

    /// Queue the behaviour of the next call carrying exactly `intent`.
    ///
    /// Useful when debouncing makes it unclear how many calls will happen:
    /// a plan for an intent that gets coalesced away is simply never used.
    pub fn plan_for(&self, intent: MoveIntent, plan: CallPlan) {
        self.lock()
            .intent_plans
            .entry(intent)
            .or_default()
            .push_back(plan);
    }

    pub fn column(&self, column: &ColumnId) -> Option<Vec<Card>> {
        self.lock().columns.get(column).cloned()
    }

    pub fn columns(&self) -> BTreeMap<ColumnId, Vec<Card>> {
        self.lock().columns.clone()
    }

    /// Every move received, in arrival order.
    pub fn moves(&self) -> Vec<MoveIntent> {
        self.lock().moves.clone()
    }

    pub fn fetch_count(&self, column: &ColumnId) -> usize {
        self.lock().fetches.iter().filter(|c| *c == column).count()
    }

    fn apply(&self, input: &MoveIntent) -> Result<Card, TransportError> {
        let mut state = self.lock();

        let from = if state
            .columns
            .get(&input.source_column_id)
            .is_some_and(|cards| ordering::position_of(cards, input.card_id).is_some())
        {
            input.source_column_id.clone()
        } else {
            state
                .columns
                .iter()
                .find(|(_, cards)| ordering::position_of(cards, input.card_id).is_some())
                .map(|(col, _)| col.clone())
                .ok_or_else(|| {
                    TransportError::Rejected(format!("card {} does not exist", input.card_id))
                })?
        };
        let to = &input.destination_column_id;

        if &from == to {
            let cards = state.columns.get(&from).cloned().unwrap_or_default();
            let next = ordering::reorder_within(&cards, input.card_id, input.new_order)
                .unwrap_or(cards);
            state.columns.insert(from, next);
        } else {
            let source = state.columns.get(&from).cloned().unwrap_or_default();
            let destination = state.columns.get(to).cloned().unwrap_or_default();
            if let Some(reordered) =
                ordering::move_across(&source, &destination, input.card_id, to, input.new_order)
            {
                state.columns.insert(from, reordered.source);
                state
                    .columns
                    .insert(to.clone(), reordered.destination.unwrap_or_default());
            }
        }

        state
            .columns
            .get(to)
            .and_then(|cards| cards.iter().find(|c| c.id == input.card_id))
            .cloned()
            .ok_or_else(|| TransportError::Rejected(format!("card {} was lost", input.card_id)))
    }
}

#[async_trait]
impl MoveTransport for MemoryBoard {
    async fn move_card(&self, input: &MoveIntent) -> Result<Card, TransportError> {
        let plan = {
            let mut state = self.lock();
            state.moves.push(input.clone());
            let specific = state
                .intent_plans
                .get_mut(input)
                .and_then(|queue| queue.pop_front());
            specific
                .or_else(|| state.plans.pop_front())
                .unwrap_or_default()
        };
        if !plan.latency.is_zero() {
            tokio::time::sleep(plan.latency).await;
        }
        if plan.fail {
            return Err(TransportError::Rejected(format!(
                "move of card {} refused",
                input.card_id
            )));
        }
        self.apply(input)
    }
}

#[async_trait]
impl ColumnFetcher for MemoryBoard {
    async fn fetch_column(&self, column: &ColumnId) -> Result<Vec<Card>, TransportError> {
        self.lock().fetches.push(column.clone());
        if !self.fetch_latency.is_zero() {
            tokio::time::sleep(self.fetch_latency).await;
        }
        self.column(column)
            .ok_or_else(|| TransportError::ColumnNotFound {
                column: column.to_string(),
            })
    }
}
