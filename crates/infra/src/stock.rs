//! Stock recording workflow.
//!
//! Drives the `Item` aggregate for purchases and movements and keeps the
//! movement history ledger in step with recorded movements.
//!
//! Ledger rows are inserted one at a time with no surrounding transaction:
//! if an insert fails, the movement and item totals are already saved and
//! the ledger is left partial. `ConsistencyChecker::cross_check_history`
//! reports such gaps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use piwi_core::{Aggregate, DomainError, HolderId, ItemId, LocationId, MovementId, PurchaseId, Quantity};
use piwi_events::Event;
use piwi_inventory::{
    CreateItem, Holder, Item, ItemCommand, Location, Movement, MovementQuantities, OverrideTotals,
    Purchase, RecordMovement, RecordPurchase,
};

use crate::history::{HistoryError, HistoryId, HistoryRecord, HistoryStore, MovementHistory};
use crate::repository::InventoryRepository;

#[derive(Debug, Error)]
pub enum StockError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("unknown location {0}")]
    UnknownLocation(LocationId),

    #[error("unknown holder {0}")]
    UnknownHolder(HolderId),

    #[error("movement {movement_id} saved but its ledger is incomplete: {source}")]
    History {
        movement_id: MovementId,
        #[source]
        source: HistoryError,
    },
}

/// A saved movement and the ledger rows written for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMovement {
    pub movement: Movement,
    pub history_ids: Vec<HistoryId>,
}

#[derive(Debug, Clone)]
pub struct StockService<R, H> {
    repo: R,
    history: MovementHistory<H, R>,
}

impl<R, H> StockService<R, H>
where
    R: InventoryRepository + Clone,
    H: HistoryStore,
{
    pub fn new(repo: R, store: H) -> Self {
        Self {
            history: MovementHistory::new(store, repo.clone()),
            repo,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn history(&self) -> &MovementHistory<H, R> {
        &self.history
    }

    fn load_item(&self, item_id: ItemId) -> Result<Item, StockError> {
        self.repo.item(item_id).ok_or(StockError::UnknownItem(item_id))
    }

    fn ensure_locations<'a>(&self, mut locations: impl Iterator<Item = &'a LocationId>) -> Result<(), StockError> {
        match locations.find(|loc| self.repo.location(**loc).is_none()) {
            Some(loc) => Err(StockError::UnknownLocation(*loc)),
            None => Ok(()),
        }
    }

    /// Decide, apply and persist one command against `item`.
    fn execute(&self, mut item: Item, command: ItemCommand) -> Result<Item, StockError> {
        let item_id = item.id_typed();
        let events = item.execute(&command).inspect_err(|e| {
            tracing::warn!(%item_id, error = %e, "item command rejected");
        })?;
        for event in &events {
            tracing::debug!(%item_id, event = %event.qualified_type(), "item event applied");
        }
        tracing::debug!(%item_id, amount = %item.amount(), avail = %item.avail(), "item totals");
        self.repo.save_item(item.clone());
        Ok(item)
    }

    pub fn create_item(&self, name: &str) -> Result<Item, StockError> {
        let item_id = ItemId::new();
        self.execute(
            Item::empty(item_id),
            ItemCommand::CreateItem(CreateItem {
                item_id,
                name: name.to_string(),
                occurred_at: Utc::now(),
            }),
        )
    }

    pub fn add_location(&self, name: &str) -> Result<Location, StockError> {
        let location = Location::new(LocationId::new(), name)?;
        self.repo.save_location(location.clone());
        Ok(location)
    }

    pub fn add_holder(&self, name: &str) -> Result<Holder, StockError> {
        let holder = Holder::new(HolderId::new(), name)?;
        self.repo.save_holder(holder.clone());
        Ok(holder)
    }

    /// Record stock bought into one or more locations.
    pub fn record_purchase(
        &self,
        item_id: ItemId,
        date: DateTime<Utc>,
        lines: BTreeMap<LocationId, Quantity>,
    ) -> Result<Purchase, StockError> {
        let item = self.load_item(item_id)?;
        self.ensure_locations(lines.keys())?;
        let purchase = Purchase::new(PurchaseId::new(), item_id, date, lines)?;
        let total = purchase.total()?;

        self.execute(
            item,
            ItemCommand::RecordPurchase(RecordPurchase {
                item_id,
                purchase_id: purchase.id,
                quantity: total,
                occurred_at: date,
            }),
        )?;
        self.repo.save_purchase(purchase.clone());
        tracing::info!(%item_id, purchase_id = %purchase.id, %total, "purchase recorded");
        Ok(purchase)
    }

    /// Record stock moved to a holder, then one ledger row per location.
    pub async fn record_movement(
        &self,
        item_id: ItemId,
        holder_id: HolderId,
        date: DateTime<Utc>,
        lines: BTreeMap<LocationId, MovementQuantities>,
    ) -> Result<RecordedMovement, StockError> {
        let item = self.load_item(item_id)?;
        if self.repo.holder(holder_id).is_none() {
            return Err(StockError::UnknownHolder(holder_id));
        }
        self.ensure_locations(lines.keys())?;
        let movement = Movement::new(MovementId::new(), item_id, holder_id, date, lines)?;
        let totals = movement.totals()?;
        let lent = totals.lent()?;

        self.execute(
            item,
            ItemCommand::RecordMovement(RecordMovement {
                item_id,
                movement_id: movement.id,
                moved: totals.moved,
                returned: totals.returned,
                occurred_at: date,
            }),
        )?;
        self.repo.save_movement(movement.clone());

        let mut history_ids = Vec::with_capacity(movement.lines.len());
        for (loc_id, quantities) in &movement.lines {
            let record = HistoryRecord {
                mov_id: movement.id,
                item_id,
                loc_id: *loc_id,
                hold_id: holder_id,
                date,
                quantities: *quantities,
            };
            let id = self.history.insert(record).await.map_err(|source| {
                tracing::error!(
                    movement_id = %movement.id,
                    written = history_ids.len(),
                    error = %source,
                    "movement history left partial"
                );
                StockError::History {
                    movement_id: movement.id,
                    source,
                }
            })?;
            history_ids.push(id);
        }

        tracing::info!(%item_id, movement_id = %movement.id, %lent, "movement recorded");
        Ok(RecordedMovement { movement, history_ids })
    }

    /// Overwrite an item's stored totals without touching its history.
    pub fn override_totals(&self, item_id: ItemId, amount: Quantity, avail: Quantity) -> Result<Item, StockError> {
        let item = self.load_item(item_id)?;
        tracing::warn!(%item_id, %amount, %avail, "stored totals overridden");
        self.execute(
            item,
            ItemCommand::OverrideTotals(OverrideTotals {
                item_id,
                amount,
                avail,
                occurred_at: Utc::now(),
            }),
        )
    }
}
