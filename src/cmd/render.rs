//! Terminal rendering shared by the commands.

use std::collections::BTreeMap;

use console::style;

use cardshift::board::{BoardEvent, Card, ColumnId, MoveOutcome};

pub fn print_column(column: &ColumnId, cards: &[Card]) {
    println!("  {} ({})", style(column).bold(), cards.len());
    if cards.is_empty() {
        println!("    {}", style("(empty)").dim());
    }
    for card in cards {
        println!("    {:>2}. #{:<4} {}", card.order, card.id, card.title);
    }
}

pub fn print_board(title: &str, columns: &BTreeMap<ColumnId, Vec<Card>>) {
    println!("{}", style(title).underlined());
    for (column, cards) in columns {
        print_column(column, cards);
    }
}

pub fn styled_outcome(outcome: MoveOutcome) -> String {
    match outcome {
        MoveOutcome::Confirmed => style(outcome).green().to_string(),
        MoveOutcome::RolledBack => style(outcome).red().to_string(),
        MoveOutcome::Superseded => style(outcome).yellow().to_string(),
        MoveOutcome::Untracked => style(outcome).dim().to_string(),
    }
}

/// One-line description of an event, or `None` for events not worth showing.
pub fn describe_event(event: &BoardEvent) -> Option<String> {
    match event {
        BoardEvent::ColumnUpdated { column_id, version } => {
            Some(format!("column {} now at v{}", column_id, version))
        }
        BoardEvent::ColumnInvalidated {
            column_id,
            refetching,
        } => Some(if *refetching {
            format!("column {} invalidated, refetching", column_id)
        } else {
            format!("column {} invalidated, fetch already running", column_id)
        }),
        BoardEvent::CardHighlighted {
            card_id,
            cross_column,
            ..
        } => Some(format!(
            "card {} highlighted ({})",
            card_id,
            if *cross_column { "cross-column" } else { "same column" }
        )),
        BoardEvent::MoveSettled {
            card_id, outcome, ..
        } => Some(format!(
            "card {} settled: {}",
            card_id,
            styled_outcome(*outcome)
        )),
    }
}
