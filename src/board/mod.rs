//! Optimistic card moves for a Kanban board client.
//!
//! ## Overview
//!
//! Dragging a card updates the cached column lists immediately, while a
//! debounced request persists the move. Rapid moves of one card collapse
//! into a single request, and when several requests for the same card are in
//! flight only the most recent one may touch the cache when it completes.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐ submit  ┌──────────────────────────────────────────────────┐
//! │  Board   │ ──────> │  session.rs   (BoardSession, public API)         │
//! │  view    │         │    └─ debounce.rs  (per-card timers)             │
//! └──────────┘         │         │                                        │
//!      ^               │         │ MoveCoordinator::execute()             │
//!      │ BoardEvent    │         v                                        │
//!      │               │  coordinator.rs  (fence stamp, optimistic write) │
//!      │               │         │                                        │
//!      │               │         │ MoveTransport::move_card()             │
//!      │               │         v                                        │
//!      │               │  reconciler.rs  (rollback / revalidate / no-op)  │
//!      └────────────── │  store.rs       (CardStore, broadcast events)    │
//!                      └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | `Card`, `MoveIntent`, `MoveContext`, `MoveOutcome`      |
//! | `ordering`  | Pure reorder arithmetic, dense renumbering              |
//! | `fence`     | `MutationFence`: per-card latest-move timestamps       |
//! | `events`    | `BoardEvent` + `broadcast_event()` helper               |
//! | `highlight` | `Highlighter` trait for the moved-card flash            |
//! | `transport` | `MoveTransport`/`ColumnFetcher` + `HttpBoardClient`     |
//! | `memory`    | `MemoryBoard`: scriptable in-memory server stand-in    |
//!
//! ## Lifecycle of one move
//!
//! 1. `BoardSession::submit()` parks the intent in the debouncer; a newer
//!    intent for the same card within the delay replaces it.
//! 2. When the timer fires, `MoveCoordinator::begin()` stamps the fence,
//!    cancels background refetches of the touched columns, snapshots them,
//!    writes the reordered lists and requests a highlight.
//! 3. The transport call runs. On completion the `Reconciler` checks the
//!    fence: a superseded completion does nothing; a current failure restores
//!    the snapshot; a current success marks the columns for background
//!    revalidation unless a fetch is already running.

pub mod coordinator;
pub mod debounce;
pub mod events;
pub mod fence;
pub mod highlight;
pub mod memory;
pub mod models;
pub mod ordering;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod transport;

pub use events::BoardEvent;
pub use models::{Card, CardId, ColumnId, MoveContext, MoveIntent, MoveOutcome};
pub use session::BoardSession;
