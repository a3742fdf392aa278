//! Ledger replay: recompute an item's totals from its history.
//!
//! The stored `amount`/`avail` on an item are a projection of its purchases
//! and movements. Replaying that history from zero must reproduce them; any
//! difference is drift. The replay is pure and report-only: it never touches
//! the stored totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use piwi_core::{DomainError, ItemId, LocationId, Quantity};

use crate::item::Item;
use crate::movement::Movement;
use crate::purchase::Purchase;

/// An (amount, availability) pair.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTotals {
    pub amount: Quantity,
    pub avail: Quantity,
}

impl StockTotals {
    pub fn new(amount: Quantity, avail: Quantity) -> Self {
        Self { amount, avail }
    }

    fn receive(&mut self, qty: Quantity) -> Result<(), DomainError> {
        self.amount = self.amount.try_add(qty)?;
        self.avail = self.avail.try_add(qty)?;
        Ok(())
    }

    fn shift(&mut self, delta: Quantity) -> Result<(), DomainError> {
        self.avail = self.avail.try_add(delta)?;
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyStatus {
    Success,
    Fail,
}

/// Totals recomputed from history, overall and per location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    pub totals: StockTotals,
    pub per_location: BTreeMap<LocationId, StockTotals>,
}

/// Replay the purchases and movements of `item_id`.
///
/// Records belonging to other items are skipped, so whole-warehouse
/// histories can be passed in.
///
/// - purchase line: `amount += q`, `avail += q`
/// - movement line: `avail += returned - moved` (amount unchanged: a
///   movement only displaces stock already owned)
///
/// Sums that leave the quantity range are a validation error.
pub fn replay<'a, P, M>(item_id: ItemId, purchases: P, movements: M) -> Result<Replay, DomainError>
where
    P: IntoIterator<Item = &'a Purchase>,
    M: IntoIterator<Item = &'a Movement>,
{
    let mut out = Replay::default();

    for purchase in purchases.into_iter().filter(|p| p.item_id == item_id) {
        for (loc, qty) in &purchase.lines {
            out.totals.receive(*qty)?;
            out.per_location.entry(*loc).or_default().receive(*qty)?;
        }
    }

    for movement in movements.into_iter().filter(|m| m.item_id == item_id) {
        for (loc, q) in &movement.lines {
            let delta = q.availability_delta()?;
            out.totals.shift(delta)?;
            out.per_location.entry(*loc).or_default().shift(delta)?;
        }
    }

    Ok(out)
}

/// Outcome of comparing an item's stored totals with its replayed history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub item_id: ItemId,
    pub item_name: String,
    pub stored: StockTotals,
    pub computed: StockTotals,
    pub per_location: BTreeMap<LocationId, StockTotals>,
    pub status: ConsistencyStatus,
}

impl ConsistencyReport {
    pub fn check<'a, P, M>(item: &Item, purchases: P, movements: M) -> Result<Self, DomainError>
    where
        P: IntoIterator<Item = &'a Purchase>,
        M: IntoIterator<Item = &'a Movement>,
    {
        let item_id = item.id_typed();
        let replayed = replay(item_id, purchases, movements)?;
        let stored = StockTotals::new(item.amount(), item.avail());

        let status = if stored == replayed.totals {
            ConsistencyStatus::Success
        } else {
            ConsistencyStatus::Fail
        };

        Ok(Self {
            item_id,
            item_name: item.name().to_string(),
            stored,
            computed: replayed.totals,
            per_location: replayed.per_location,
            status,
        })
    }

    pub fn is_consistent(&self) -> bool {
        self.status == ConsistencyStatus::Success
    }

    /// `stored - computed`, per total.
    pub fn drift(&self) -> Result<StockTotals, DomainError> {
        Ok(StockTotals::new(
            self.stored.amount.try_sub(self.computed.amount)?,
            self.stored.avail.try_sub(self.computed.avail)?,
        ))
    }
}
