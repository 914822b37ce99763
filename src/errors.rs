//! Typed error hierarchy for cardshift.
//!
//! Two enums cover the engine:
//! - `TransportError`: the board server (or a stand-in) refused or failed a call
//! - `MoveError`: what an awaiting caller of a move observes

use thiserror::Error;

/// Errors from a transport or column fetcher.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Board server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Move rejected: {0}")]
    Rejected(String),

    #[error("Column '{column}' not found on board")]
    ColumnNotFound { column: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Errors surfaced to callers that await a move.
///
/// By the time a caller sees one of these, the store has already been
/// rolled back (or left alone, if the move was superseded).
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("Move of card {card_id} failed: {source}")]
    Transport {
        card_id: i64,
        #[source]
        source: TransportError,
    },

    #[error("Move task aborted: {0}")]
    TaskAborted(String),
}

impl MoveError {
    /// The transport error behind this failure, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            MoveError::Transport { source, .. } => Some(source),
            MoveError::TaskAborted(_) => None,
        }
    }
}
