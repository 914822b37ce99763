//! Ordered card store: the client-side cache of column card lists.
//!
//! A keyed map from `ColumnId` to the cached list plus, per key, a version
//! counter, a stale flag and at most one in-flight background fetch.
//!
//! All methods are synchronous except `load`. Background refetches are
//! spawned on the ambient tokio runtime, so `invalidate` must be called from
//! within one.
//!
//! Read-modify-write sequences that span several keys go through
//! [`CardStore::transact`], which holds the store lock for the whole closure.
//! Events raised inside a transaction are published after the lock is
//! released.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use super::events::{BoardEvent, broadcast_event};
use super::models::{Card, ColumnId};
use super::transport::ColumnFetcher;
use crate::errors::TransportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidateOptions {
    /// Leave a running fetch alone instead of restarting it.
    pub only_if_idle: bool,
}

impl InvalidateOptions {
    pub fn background() -> Self {
        Self { only_if_idle: true }
    }
}

/// What `invalidate` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// A new background fetch was started.
    Refetching,
    /// A fetch was already running and was kept.
    AlreadyFetching,
    /// Nothing is cached under the key, so there was nothing to mark.
    NotCached,
}

struct InFlight {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct Entry {
    cards: Option<Vec<Card>>,
    version: u64,
    stale: bool,
    in_flight: Option<InFlight>,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<ColumnId, Entry>,
    next_generation: u64,
}

/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct CardStore {
    state: Arc<Mutex<StoreState>>,
    fetcher: Arc<dyn ColumnFetcher>,
    events: broadcast::Sender<BoardEvent>,
}

/// Exclusive access to the store for the duration of [`CardStore::transact`].
pub struct StoreTxn<'a> {
    store: &'a CardStore,
    state: MutexGuard<'a, StoreState>,
    events: Vec<BoardEvent>,
}

impl StoreTxn<'_> {
    pub fn get(&self, column: &ColumnId) -> Option<Vec<Card>> {
        self.state
            .entries
            .get(column)
            .and_then(|e| e.cards.clone())
    }

    /// Replace the cached list for `column`. Returns the new version.
    pub fn set(&mut self, column: ColumnId, cards: Vec<Card>) -> u64 {
        let entry = self.state.entries.entry(column.clone()).or_default();
        entry.cards = Some(cards);
        entry.version += 1;
        entry.stale = false;
        let version = entry.version;

        tracing::trace!(%column, version, "column written");
        self.events.push(BoardEvent::ColumnUpdated {
            column_id: column,
            version,
        });
        version
    }

    pub fn cancel_in_flight(&mut self, column: &ColumnId) -> bool {
        let taken = self
            .state
            .entries
            .get_mut(column)
            .and_then(|e| e.in_flight.take());
        match taken {
            Some(in_flight) => {
                in_flight.handle.abort();
                tracing::debug!(%column, generation = in_flight.generation, "cancelled in-flight fetch");
                true
            }
            None => false,
        }
    }

    pub fn invalidate(&mut self, column: &ColumnId, options: InvalidateOptions) -> Invalidation {
        self.state.next_generation += 1;
        let generation = self.state.next_generation;
        let Some(entry) = self
            .state
            .entries
            .get_mut(column)
            .filter(|e| e.cards.is_some())
        else {
            tracing::debug!(%column, "invalidate skipped, column not cached");
            return Invalidation::NotCached;
        };
        entry.stale = true;

        let outcome = match entry.in_flight.take() {
            Some(existing) if options.only_if_idle => {
                entry.in_flight = Some(existing);
                Invalidation::AlreadyFetching
            }
            existing => {
                if let Some(existing) = existing {
                    existing.handle.abort();
                }
                // Spawned under the lock so the entry records the fetch
                // before the task can try to complete it.
                let store = self.store.clone();
                let key = column.clone();
                let handle = tokio::spawn(async move {
                    let result = store.fetcher.fetch_column(&key).await;
                    store.finish_fetch(&key, generation, result);
                });
                entry.in_flight = Some(InFlight {
                    generation,
                    handle: handle.abort_handle(),
                });
                Invalidation::Refetching
            }
        };

        tracing::debug!(%column, ?outcome, "column invalidated");
        self.events.push(BoardEvent::ColumnInvalidated {
            column_id: column.clone(),
            refetching: outcome == Invalidation::Refetching,
        });
        outcome
    }
}

impl CardStore {
    pub fn new(fetcher: Arc<dyn ColumnFetcher>, events: broadcast::Sender<BoardEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            fetcher,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the store locked. No other store operation, on any
    /// thread, interleaves with the closure.
    pub fn transact<R>(&self, f: impl FnOnce(&mut StoreTxn<'_>) -> R) -> R {
        let mut txn = StoreTxn {
            store: self,
            state: self.lock(),
            events: Vec::new(),
        };
        let out = f(&mut txn);
        let StoreTxn { state, events, .. } = txn;
        drop(state);
        for event in events {
            broadcast_event(&self.events, event);
        }
        out
    }

    /// Cached list for `column`, if present.
    pub fn get(&self, column: &ColumnId) -> Option<Vec<Card>> {
        self.transact(|txn| txn.get(column))
    }

    /// Replace the cached list for `column`. Returns the new version.
    pub fn set(&self, column: ColumnId, cards: Vec<Card>) -> u64 {
        self.transact(|txn| txn.set(column, cards))
    }

    /// Number of writes `column` has seen. Zero for unknown columns.
    pub fn version(&self, column: &ColumnId) -> u64 {
        self.lock().entries.get(column).map_or(0, |e| e.version)
    }

    pub fn is_fetching(&self, column: &ColumnId) -> bool {
        self.lock()
            .entries
            .get(column)
            .is_some_and(|e| e.in_flight.is_some())
    }

    pub fn is_stale(&self, column: &ColumnId) -> bool {
        self.lock().entries.get(column).is_some_and(|e| e.stale)
    }

    /// Abort the background fetch for `column`, if one is running.
    ///
    /// A fetch that already resolved but has not yet written is discarded as
    /// well. Returns whether anything was cancelled.
    pub fn cancel_in_flight(&self, column: &ColumnId) -> bool {
        self.transact(|txn| txn.cancel_in_flight(column))
    }

    /// Mark `column` stale and refetch it in the background. Columns that
    /// are not cached are left alone.
    pub fn invalidate(&self, column: &ColumnId, options: InvalidateOptions) -> Invalidation {
        self.transact(|txn| txn.invalidate(column, options))
    }

    fn finish_fetch(
        &self,
        column: &ColumnId,
        generation: u64,
        result: Result<Vec<Card>, TransportError>,
    ) {
        let version = {
            let mut state = self.lock();
            let Some(entry) = state.entries.get_mut(column) else {
                return;
            };
            match &entry.in_flight {
                Some(f) if f.generation == generation => {}
                _ => {
                    tracing::debug!(%column, generation, "discarding superseded fetch result");
                    return;
                }
            }
            entry.in_flight = None;

            match result {
                Ok(mut cards) => {
                    cards.sort_by_key(|c| c.order);
                    entry.cards = Some(cards);
                    entry.version += 1;
                    entry.stale = false;
                    entry.version
                }
                Err(e) => {
                    tracing::warn!(%column, error = %e, "background refetch failed");
                    return;
                }
            }
        };
        broadcast_event(
            &self.events,
            BoardEvent::ColumnUpdated {
                column_id: column.clone(),
                version,
            },
        );
    }

    /// Fetch-through read: return the cached list, or fetch and cache it.
    ///
    /// If something else populated the column while the fetch was running
    /// (for example an optimistic move), that data wins and is returned.
    pub async fn load(&self, column: &ColumnId) -> Result<Vec<Card>, TransportError> {
        if let Some(cards) = self.get(column) {
            return Ok(cards);
        }

        let mut fetched = self.fetcher.fetch_column(column).await?;
        fetched.sort_by_key(|c| c.order);

        let (cards, version) = {
            let mut state = self.lock();
            let entry = state.entries.entry(column.clone()).or_default();
            match &entry.cards {
                Some(existing) => (existing.clone(), None),
                None => {
                    entry.cards = Some(fetched.clone());
                    entry.version += 1;
                    (fetched, Some(entry.version))
                }
            }
        };
        if let Some(version) = version {
            broadcast_event(
                &self.events,
                BoardEvent::ColumnUpdated {
                    column_id: column.clone(),
                    version,
                },
            );
        }
        Ok(cards)
    }

    /// Copy of every cached column, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<ColumnId, Vec<Card>> {
        self.lock()
            .entries
            .iter()
            .filter_map(|(k, e)| e.cards.clone().map(|c| (k.clone(), c)))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }
}
