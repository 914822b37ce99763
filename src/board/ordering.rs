//! Pure list arithmetic behind an optimistic move.
//!
//! Every function here returns lists whose `order` fields equal their
//! positional index, so callers can write the result straight into the store.

use super::models::{Card, CardId, ColumnId};

/// Result of reordering: the new source list and, for cross-column moves,
/// the new destination list.
#[derive(Debug, Clone, PartialEq)]
pub struct Reordered {
    pub source: Vec<Card>,
    pub destination: Option<Vec<Card>>,
}

/// Rewrite every card's `order` to its index.
pub fn renumber(cards: &mut [Card]) {
    for (idx, card) in cards.iter_mut().enumerate() {
        card.order = idx;
    }
}

/// Index of `card_id` in `cards`, if present.
pub fn position_of(cards: &[Card], card_id: CardId) -> Option<usize> {
    cards.iter().position(|c| c.id == card_id)
}

/// Move `card_id` to `new_order` inside a single column.
///
/// `new_order` is an index into the list *after* the card has been removed;
/// anything past the end appends. Returns `None` if the card is not in the list.
pub fn reorder_within(cards: &[Card], card_id: CardId, new_order: usize) -> Option<Vec<Card>> {
    let from = position_of(cards, card_id)?;
    let mut next = cards.to_vec();
    let card = next.remove(from);
    let at = new_order.min(next.len());
    next.insert(at, card);
    renumber(&mut next);
    Some(next)
}

/// Move `card_id` out of `source` into `destination` at `new_order`.
///
/// The moved copy takes `destination_id` as its column. Returns `None` if
/// the card is not in `source`.
pub fn move_across(
    source: &[Card],
    destination: &[Card],
    card_id: CardId,
    destination_id: &ColumnId,
    new_order: usize,
) -> Option<Reordered> {
    let from = position_of(source, card_id)?;

    let mut next_source = source.to_vec();
    let mut card = next_source.remove(from);
    renumber(&mut next_source);

    card.column_id = destination_id.clone();
    card.order = new_order;

    let mut next_destination = destination.to_vec();
    let at = new_order.min(next_destination.len());
    next_destination.insert(at, card);
    renumber(&mut next_destination);

    Some(Reordered {
        source: next_source,
        destination: Some(next_destination),
    })
}

/// True if `order` equals the positional index for every card.
pub fn is_dense(cards: &[Card]) -> bool {
    cards.iter().enumerate().all(|(idx, c)| c.order == idx)
}
