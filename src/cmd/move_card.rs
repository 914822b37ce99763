//! Single move against a live board server: `cardshift move`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;
use tokio::sync::broadcast;

use cardshift::board::transport::HttpBoardClient;
use cardshift::board::{BoardEvent, BoardSession, CardId, ColumnId, MoveIntent, MoveOutcome};
use cardshift::config::CardshiftConfig;
use cardshift::errors::TransportError;

use super::render::{print_column, styled_outcome};

/// Drain the receiver for the settle event of `card_id`.
fn settled_outcome(rx: &mut broadcast::Receiver<BoardEvent>, card_id: CardId) -> Option<MoveOutcome> {
    loop {
        match rx.try_recv() {
            Ok(BoardEvent::MoveSettled {
                card_id: id,
                outcome,
                ..
            }) if id == card_id => return Some(outcome),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return None,
        }
    }
}

pub async fn cmd_move(
    config: &CardshiftConfig,
    card: i64,
    from: &str,
    to: &str,
    position: usize,
) -> Result<()> {
    let client = Arc::new(HttpBoardClient::new(
        &config.server.base_url,
        config.server.project_id,
    ));
    let session = BoardSession::new(config, client.clone(), client);
    let source = ColumnId::from(from);
    let destination = ColumnId::from(to);

    session
        .store()
        .load(&source)
        .await
        .with_context(|| format!("Failed to load column '{}'", source))?;
    if destination != source {
        session
            .store()
            .load(&destination)
            .await
            .with_context(|| format!("Failed to load column '{}'", destination))?;
    }

    let mut rx = session.subscribe();
    let intent = MoveIntent::new(card, from, to, position);
    tracing::info!(card_id = card, %source, %destination, position, "moving card");

    let result = session.execute(intent).await;
    let outcome = settled_outcome(&mut rx, CardId(card));

    println!();
    match &result {
        Ok(moved) => println!(
            "{} card #{} is now at {} in '{}'",
            style("Moved").green().bold(),
            moved.id,
            moved.order,
            moved.column_id
        ),
        Err(e) => {
            println!("{} {}", style("Move failed:").red().bold(), e);
            if let Some(TransportError::Status { status: 404, .. }) = e.transport() {
                println!("Check that card {} exists in project {}.", card, config.server.project_id);
            }
        }
    }
    if let Some(outcome) = outcome {
        println!("Outcome: {}", styled_outcome(outcome));
    }
    println!();

    for column in [&source, &destination] {
        if let Some(cards) = session.store().get(column) {
            print_column(column, &cards);
        }
        if column == &destination && source == destination {
            break;
        }
    }
    println!();

    if let Err(e) = result {
        bail!("Move of card {} did not go through: {}", card, e);
    }
    Ok(())
}
