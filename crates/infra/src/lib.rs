//! Infrastructure layer: storage, the movement history ledger, consistency
//! checks over stored data, and configuration.

pub mod config;
pub mod consistency;
pub mod history;
pub mod repository;
pub mod stock;

pub use config::Settings;
pub use consistency::{ConsistencyChecker, ConsistencyError, ConsistencySummary, HistoryMismatch};
pub use history::{
    HistoryColumn, HistoryCondition, HistoryEntry, HistoryErase, HistoryError, HistoryId, HistoryQuery,
    HistoryRecord, HistoryStore, HistoryUpdate, InMemoryHistoryStore, Logic, MovementHistory, SortOrder,
    SqliteHistoryStore,
};
pub use repository::{InMemoryInventoryRepository, InventoryRepository};
pub use stock::{RecordedMovement, StockError, StockService};
