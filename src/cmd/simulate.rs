//! Scripted drag sessions against an in-memory board: `cardshift simulate`.
//!
//! A scenario file seeds the board and lists moves with per-call latency and
//! failure, which makes debouncing, fencing and rollback visible without a
//! server. Example:
//!
//! ```json
//! {
//!   "debounce_ms": 50,
//!   "columns": {
//!     "todo": [{ "id": 1, "title": "Login page" }, { "id": 2 }],
//!     "done": []
//!   },
//!   "steps": [
//!     { "card": 1, "from": "todo", "to": "done", "position": 0, "latency_ms": 200 },
//!     { "card": 2, "from": "todo", "position": 0, "fail": true, "immediate": true }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use console::style;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use cardshift::board::memory::{CallPlan, MemoryBoard};
use cardshift::board::{BoardEvent, BoardSession, Card, CardId, ColumnId, MoveIntent};
use cardshift::config::CardshiftConfig;

use super::render::{describe_event, print_board};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);
const SETTLE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    pub columns: BTreeMap<String, Vec<ScenarioCard>>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioCard {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioStep {
    pub card: i64,
    pub from: String,
    /// Defaults to `from`.
    #[serde(default)]
    pub to: Option<String>,
    pub position: usize,
    /// Pause after this step before the next one.
    #[serde(default)]
    pub wait_ms: u64,
    /// How long the server takes to answer this move.
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub fail: bool,
    /// Skip the debouncer.
    #[serde(default)]
    pub immediate: bool,
}

impl ScenarioStep {
    fn intent(&self) -> MoveIntent {
        MoveIntent::new(
            self.card,
            &self.from,
            self.to.as_deref().unwrap_or(&self.from),
            self.position,
        )
    }

    fn plan(&self) -> CallPlan {
        if self.fail {
            CallPlan::fail_after(self.latency_ms)
        } else {
            CallPlan::ok_after(self.latency_ms)
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario: {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            let to = step.to.as_deref().unwrap_or(&step.from);
            for column in [step.from.as_str(), to] {
                if !self.columns.contains_key(column) {
                    bail!("Step {} refers to unknown column '{}'", i + 1, column);
                }
            }
        }
        Ok(())
    }
}

/// Print every event with its offset from the start of the run.
fn spawn_event_printer(
    mut rx: broadcast::Receiver<BoardEvent>,
    started: Instant,
    settled: Arc<AtomicUsize>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if matches!(event, BoardEvent::MoveSettled { .. }) {
                        settled.fetch_add(1, Ordering::SeqCst);
                    }
                    if let Some(line) = describe_event(&event) {
                        let elapsed = started.elapsed().as_millis();
                        println!("{} {}", style(format!("[{:>5}ms]", elapsed)).dim(), line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Ids per column, in list order.
fn layout(columns: &BTreeMap<ColumnId, Vec<Card>>) -> BTreeMap<ColumnId, Vec<CardId>> {
    columns
        .iter()
        .map(|(column, cards)| (column.clone(), cards.iter().map(|c| c.id).collect()))
        .collect()
}

pub async fn cmd_simulate(
    mut config: CardshiftConfig,
    scenario_path: &Path,
    debounce_override: Option<u64>,
) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    scenario.validate()?;

    if let Some(ms) = debounce_override.or(scenario.debounce_ms) {
        config.sync.debounce_ms = ms;
    }

    let board = Arc::new(MemoryBoard::new());
    for (name, cards) in &scenario.columns {
        let column = ColumnId::from(name.as_str());
        let cards = cards
            .iter()
            .map(|c| Card::new(c.id, name, 0, &c.title))
            .collect();
        board.put_column(&column, cards);
    }

    let session = BoardSession::new(&config, board.clone(), board.clone());
    for column in board.columns().keys() {
        session.store().load(column).await?;
    }

    println!();
    println!(
        "{} {} steps, debounce {}ms",
        style("Simulating").bold(),
        scenario.steps.len(),
        config.sync.debounce_ms
    );
    println!();

    let started = Instant::now();
    let settled = Arc::new(AtomicUsize::new(0));
    let printer = spawn_event_printer(session.subscribe(), started, Arc::clone(&settled));

    for step in &scenario.steps {
        let intent = step.intent();
        board.plan_for(intent.clone(), step.plan());
        tracing::debug!(card_id = step.card, immediate = step.immediate, "scenario step");
        if step.immediate {
            session.submit_immediate(intent);
        } else {
            session.submit(intent);
        }
        if step.wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.wait_ms)).await;
        }
    }

    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        let columns: Vec<ColumnId> = board.columns().into_keys().collect();
        let quiet = session.pending_len() == 0
            && settled.load(Ordering::SeqCst) >= board.moves().len()
            && !columns.iter().any(|c| session.store().is_fetching(c));
        if quiet {
            break;
        }
        if Instant::now() >= deadline {
            printer.abort();
            bail!("Scenario did not settle within {:?}", SETTLE_TIMEOUT);
        }
        tokio::time::sleep(SETTLE_POLL).await;
    }
    // Let the printer catch up with the last events.
    tokio::task::yield_now().await;
    printer.abort();

    let client = session.store().snapshot();
    let server = board.columns();

    println!();
    print_board("Client cache", &client);
    println!();
    print_board("Server", &server);
    println!();
    println!(
        "{} moves sent for {} steps",
        board.moves().len(),
        scenario.steps.len()
    );
    if layout(&client) == layout(&server) {
        println!("{}", style("Client and server agree.").green());
    } else {
        println!("{}", style("Client and server differ.").yellow());
    }
    println!();

    Ok(())
}
