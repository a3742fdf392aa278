//! Inventory domain module.
//!
//! Items (event-sourced, carrying the stored stock totals), purchases,
//! movements, location/holder terms, and the pure replay that recomputes an
//! item's totals from its purchase and movement history.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod consistency;
pub mod item;
pub mod movement;
pub mod purchase;
pub mod term;

pub use consistency::{replay, ConsistencyReport, ConsistencyStatus, Replay, StockTotals};
pub use item::{
    CreateItem, Item, ItemCommand, ItemCreated, ItemEvent, OverrideTotals, RecordMovement,
    RecordPurchase, StockMoved, StockReceived, TotalsOverridden,
};
pub use movement::{Movement, MovementQuantities};
pub use purchase::Purchase;
pub use term::{Holder, Location};
