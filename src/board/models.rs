use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable card identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub i64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CardId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(CardId)
            .map_err(|_| format!("Invalid card id: {}", s))
    }
}

/// Cache key of a column card list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub String);

impl ColumnId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ColumnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A card as held in a column list.
///
/// Only `id`, `column_id` and `order` are read or written by the move engine.
/// Everything else the server sends is kept verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    #[serde(alias = "column")]
    pub column_id: ColumnId,
    #[serde(alias = "position")]
    pub order: usize,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Card {
    pub fn new(id: i64, column: &str, order: usize, title: &str) -> Self {
        Self {
            id: CardId(id),
            column_id: ColumnId::from(column),
            order,
            title: title.to_string(),
            fields: serde_json::Map::new(),
        }
    }
}

/// A single user gesture: "put this card at that index of that column".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveIntent {
    pub card_id: CardId,
    pub source_column_id: ColumnId,
    pub destination_column_id: ColumnId,
    pub new_order: usize,
}

impl MoveIntent {
    pub fn new(card_id: i64, from: &str, to: &str, new_order: usize) -> Self {
        Self {
            card_id: CardId(card_id),
            source_column_id: ColumnId::from(from),
            destination_column_id: ColumnId::from(to),
            new_order,
        }
    }

    pub fn is_cross_column(&self) -> bool {
        self.source_column_id != self.destination_column_id
    }
}

/// Rollback snapshot produced by the optimistic phase of one move.
///
/// `previous_source` is `None` when the optimistic phase was skipped, in which
/// case there is nothing to roll back or reconcile against. For same-column
/// moves `previous_destination` is always `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveContext {
    pub previous_source: Option<Vec<Card>>,
    pub previous_destination: Option<Vec<Card>>,
    pub timestamp: i64,
}

impl MoveContext {
    pub fn untracked(timestamp: i64) -> Self {
        Self {
            previous_source: None,
            previous_destination: None,
            timestamp,
        }
    }

    pub fn has_snapshot(&self) -> bool {
        self.previous_source.is_some()
    }
}

/// How a move completion was settled against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    /// Transport succeeded; affected columns queued for background revalidation.
    Confirmed,
    /// Transport failed; the pre-move lists were restored.
    RolledBack,
    /// A newer move of the same card owns the fence; nothing was touched.
    Superseded,
    /// The optimistic phase never ran, so there was nothing to reconcile.
    Untracked,
}

impl MoveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::RolledBack => "rolled_back",
            Self::Superseded => "superseded",
            Self::Untracked => "untracked",
        }
    }
}

impl fmt::Display for MoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
