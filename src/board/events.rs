use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::{CardId, ColumnId, MoveOutcome};

/// Default capacity of a session's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Board event types ────────────────────────────────────────────────

/// Everything a board view can observe about the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BoardEvent {
    /// A column's cached list was replaced. `version` is the store version
    /// after the write.
    ColumnUpdated { column_id: ColumnId, version: u64 },
    /// A column was marked stale and, if idle, a background refetch started.
    ColumnInvalidated { column_id: ColumnId, refetching: bool },
    /// The moved card should flash.
    CardHighlighted {
        card_id: CardId,
        cross_column: bool,
        color: Option<String>,
    },
    /// A move completion was settled against the store.
    MoveSettled {
        card_id: CardId,
        timestamp: i64,
        outcome: MoveOutcome,
    },
}

/// Send an event to all subscribers, ignoring the no-receiver case.
pub fn broadcast_event(tx: &broadcast::Sender<BoardEvent>, event: BoardEvent) {
    // An Err only means nobody is listening right now.
    let _ = tx.send(event);
}
