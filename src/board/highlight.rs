use tokio::sync::broadcast;

use super::events::{BoardEvent, broadcast_event};
use super::models::CardId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightOptions {
    pub cross_column: bool,
    pub color: Option<String>,
}

/// Visual flash for a card that just moved. Fire-and-forget.
pub trait Highlighter: Send + Sync {
    fn highlight(&self, card_id: CardId, options: HighlightOptions);
}

/// Publishes highlight requests on the board event channel for the view to pick up.
pub struct BroadcastHighlighter {
    tx: broadcast::Sender<BoardEvent>,
}

impl BroadcastHighlighter {
    pub fn new(tx: broadcast::Sender<BoardEvent>) -> Self {
        Self { tx }
    }
}

impl Highlighter for BroadcastHighlighter {
    fn highlight(&self, card_id: CardId, options: HighlightOptions) {
        broadcast_event(
            &self.tx,
            BoardEvent::CardHighlighted {
                card_id,
                cross_column: options.cross_column,
                color: options.color,
            },
        );
    }
}

pub struct NoopHighlighter;

impl Highlighter for NoopHighlighter {
    fn highlight(&self, _card_id: CardId, _options: HighlightOptions) {}
}
