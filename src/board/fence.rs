//! Per-card fencing tokens.
//!
//! Every accepted move stamps its card with a fresh timestamp. A completion
//! may only touch the store while its own timestamp is still the stamp on
//! record; anything older has been superseded.
//!
//! Stamping and checking happen inside a `CardStore` transaction, so the
//! store lock is always taken before the fence lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use super::models::CardId;

#[derive(Debug, Default)]
struct FenceState {
    stamps: HashMap<CardId, i64>,
    last_issued: i64,
}

#[derive(Debug, Default)]
pub struct MutationFence {
    state: Mutex<FenceState>,
}

impl MutationFence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FenceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a new timestamp for `card_id` and record it, replacing any
    /// previous stamp.
    ///
    /// Wall-clock milliseconds, bumped so every issued value is strictly
    /// greater than the one before it.
    pub fn stamp(&self, card_id: CardId) -> i64 {
        let mut state = self.lock();
        let now = Utc::now().timestamp_millis();
        let ts = now.max(state.last_issued + 1);
        state.last_issued = ts;
        state.stamps.insert(card_id, ts);
        ts
    }

    /// Whether `timestamp` is the latest stamp recorded for `card_id`.
    pub fn is_current(&self, card_id: CardId, timestamp: i64) -> bool {
        self.lock().stamps.get(&card_id) == Some(&timestamp)
    }

    /// Latest stamp for `card_id`, if the card was ever moved.
    pub fn current(&self, card_id: CardId) -> Option<i64> {
        self.lock().stamps.get(&card_id).copied()
    }
}
