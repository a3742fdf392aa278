//! Consistency checks over stored inventory.
//!
//! Loads an item with its purchases and movements from the repository and
//! compares the stored totals with a replay of that history. Report-only:
//! nothing is ever corrected here.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use piwi_core::{DomainError, ItemId, LocationId, MovementId};
use piwi_inventory::{ConsistencyReport, MovementQuantities};

use crate::history::{HistoryError, HistoryQuery, HistoryStore};
use crate::repository::InventoryRepository;

#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("{0} is not an item")]
    NotAnItem(ItemId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Reports for every item, plus pass/fail counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencySummary {
    pub reports: Vec<ConsistencyReport>,
    pub passed: usize,
    pub failed: usize,
}

impl ConsistencySummary {
    pub fn is_consistent(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConsistencyReport> {
        self.reports.iter().filter(|r| !r.is_consistent())
    }
}

/// A (movement, location) pair where the ledger disagrees with the movement record.
///
/// `expected` is `None` for ledger rows with no matching movement line;
/// `recorded` is `None` for movement lines missing from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryMismatch {
    pub movement_id: MovementId,
    pub location_id: LocationId,
    pub expected: Option<MovementQuantities>,
    pub recorded: Option<MovementQuantities>,
}

#[derive(Debug, Clone)]
pub struct ConsistencyChecker<R> {
    repo: R,
}

impl<R> ConsistencyChecker<R>
where
    R: InventoryRepository,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Replay one item's history against its stored totals.
    pub fn check_item(&self, item_id: ItemId) -> Result<ConsistencyReport, ConsistencyError> {
        let item = self.repo.item(item_id).ok_or_else(|| {
            tracing::warn!(%item_id, "consistency check requested for unknown item");
            ConsistencyError::NotAnItem(item_id)
        })?;

        let purchases = self.repo.purchases_for_item(item_id);
        let movements = self.repo.movements_for_item(item_id);
        let report = ConsistencyReport::check(&item, &purchases, &movements)?;

        if report.is_consistent() {
            tracing::debug!(%item_id, "stock totals consistent");
        } else {
            let drift = report.drift()?;
            tracing::warn!(
                %item_id,
                item = %report.item_name,
                amount_drift = %drift.amount,
                avail_drift = %drift.avail,
                "stock totals drifted from history"
            );
        }
        Ok(report)
    }

    /// Check every item, ordered by item name.
    pub fn summary(&self) -> Result<ConsistencySummary, ConsistencyError> {
        let mut summary = ConsistencySummary::default();
        for item in self.repo.items() {
            let item_id = item.id_typed();
            let purchases = self.repo.purchases_for_item(item_id);
            let movements = self.repo.movements_for_item(item_id);
            let report = ConsistencyReport::check(&item, &purchases, &movements).inspect_err(|e| {
                tracing::error!(%item_id, error = %e, "stock history cannot be replayed");
            })?;
            if report.is_consistent() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            summary.reports.push(report);
        }
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            "consistency check complete"
        );
        Ok(summary)
    }

    /// Compare an item's movement lines with its ledger rows.
    ///
    /// Ledger rows for the same (movement, location) are summed. An empty
    /// result means the ledger mirrors the movements exactly.
    pub async fn cross_check_history<H>(
        &self,
        item_id: ItemId,
        history: &H,
    ) -> Result<Vec<HistoryMismatch>, ConsistencyError>
    where
        H: HistoryStore,
    {
        if self.repo.item(item_id).is_none() {
            return Err(ConsistencyError::NotAnItem(item_id));
        }

        let mut expected: BTreeMap<(MovementId, LocationId), MovementQuantities> = BTreeMap::new();
        for movement in self.repo.movements_for_item(item_id) {
            for (loc, q) in &movement.lines {
                let slot = expected.entry((movement.id, *loc)).or_default();
                *slot = slot.try_add(q)?;
            }
        }

        let mut recorded: BTreeMap<(MovementId, LocationId), MovementQuantities> = BTreeMap::new();
        for row in history.get(&HistoryQuery::new().item_id(item_id)).await? {
            let slot = recorded.entry((row.mov_id, row.loc_id)).or_default();
            *slot = slot.try_add(&row.quantities())?;
        }

        let mut keys: Vec<(MovementId, LocationId)> = expected.keys().chain(recorded.keys()).copied().collect();
        keys.sort();
        keys.dedup();

        let mismatches: Vec<HistoryMismatch> = keys
            .into_iter()
            .filter_map(|key| {
                let (e, r) = (expected.get(&key).copied(), recorded.get(&key).copied());
                (e != r).then_some(HistoryMismatch {
                    movement_id: key.0,
                    location_id: key.1,
                    expected: e,
                    recorded: r,
                })
            })
            .collect();

        if !mismatches.is_empty() {
            tracing::warn!(%item_id, count = mismatches.len(), "movement history disagrees with movements");
        }
        Ok(mismatches)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::Utc;

    use piwi_core::{Aggregate, HolderId, PurchaseId, Quantity};
    use piwi_inventory::{
        ConsistencyStatus, CreateItem, Item, ItemCommand, Movement, OverrideTotals, Purchase, StockTotals,
    };

    use super::*;
    use crate::history::{HistoryRecord, InMemoryHistoryStore};
    use crate::repository::InMemoryInventoryRepository;

    fn item(name: &str, amount: i64, avail: i64) -> Item {
        let item_id = ItemId::new();
        let mut item = Item::empty(item_id);
        let commands = [
            ItemCommand::CreateItem(CreateItem {
                item_id,
                name: name.into(),
                occurred_at: Utc::now(),
            }),
            ItemCommand::OverrideTotals(OverrideTotals {
                item_id,
                amount: Quantity::units(amount),
                avail: Quantity::units(avail),
                occurred_at: Utc::now(),
            }),
        ];
        for cmd in commands {
            item.execute(&cmd).unwrap();
        }
        item
    }

    fn q(moved: i64, returned: i64, donated: i64, lost: i64) -> MovementQuantities {
        MovementQuantities::new(
            Quantity::units(moved),
            Quantity::units(returned),
            Quantity::units(donated),
            Quantity::units(lost),
        )
        .unwrap()
    }

    /// Item bought 10 at one location and moved 4 (1 returned, 1 donated).
    fn seeded(stored_avail: i64) -> (Arc<InMemoryInventoryRepository>, ItemId, Movement) {
        let repo = Arc::new(InMemoryInventoryRepository::new());
        let tent = item("Tent", 10, stored_avail);
        let item_id = tent.id_typed();
        repo.save_item(tent);

        let loc = LocationId::new();
        repo.save_purchase(
            Purchase::new(PurchaseId::new(), item_id, Utc::now(), BTreeMap::from([(loc, Quantity::units(10))])).unwrap(),
        );
        let movement =
            Movement::new(MovementId::new(), item_id, HolderId::new(), Utc::now(), BTreeMap::from([(loc, q(4, 1, 1, 0))]))
                .unwrap();
        repo.save_movement(movement.clone());
        (repo, item_id, movement)
    }

    #[test]
    fn check_item_replays_history() {
        let (repo, item_id, _) = seeded(7);
        let report = ConsistencyChecker::new(repo).check_item(item_id).unwrap();

        assert_eq!(report.status, ConsistencyStatus::Success);
        assert_eq!(report.computed, StockTotals::new(Quantity::units(10), Quantity::units(7)));
    }

    #[test]
    fn unknown_item_is_an_error() {
        let (repo, _, _) = seeded(7);
        let missing = ItemId::new();
        let err = ConsistencyChecker::new(repo).check_item(missing).unwrap_err();
        assert!(matches!(err, ConsistencyError::NotAnItem(id) if id == missing));
    }

    #[test]
    fn summary_counts_and_orders_by_name() {
        let (repo, _, _) = seeded(9);
        repo.save_item(item("Axe", 0, 0));

        let summary = ConsistencyChecker::new(repo).summary().unwrap();

        let names: Vec<&str> = summary.reports.iter().map(|r| r.item_name.as_str()).collect();
        assert_eq!(names, ["Axe", "Tent"]);
        assert_eq!((summary.passed, summary.failed), (1, 1));
        assert!(!summary.is_consistent());
        assert_eq!(summary.failures().next().map(|r| r.item_name.as_str()), Some("Tent"));
    }

    #[test]
    fn summary_serializes_for_the_report_screen() {
        let (repo, _, _) = seeded(7);
        let summary = ConsistencyChecker::new(repo).summary().unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["passed"], 1);
        assert_eq!(json["reports"][0]["status"], "success");
        assert_eq!(json["reports"][0]["computed"]["avail"], "7");
    }

    #[tokio::test]
    async fn cross_check_reports_missing_and_stray_rows() {
        let (repo, item_id, movement) = seeded(7);
        let checker = ConsistencyChecker::new(repo);
        let history = InMemoryHistoryStore::new();
        let (loc, line) = movement.lines.iter().next().map(|(l, q)| (*l, *q)).unwrap();

        let missing = checker.cross_check_history(item_id, &history).await.unwrap();
        assert_eq!(
            missing,
            vec![HistoryMismatch {
                movement_id: movement.id,
                location_id: loc,
                expected: Some(line),
                recorded: None,
            }]
        );

        let record = HistoryRecord {
            mov_id: movement.id,
            item_id,
            loc_id: loc,
            hold_id: movement.holder_id,
            date: movement.date,
            quantities: line,
        };
        history.insert(&record).await.unwrap();
        assert!(checker.cross_check_history(item_id, &history).await.unwrap().is_empty());

        let stray_loc = LocationId::new();
        history
            .insert(&HistoryRecord {
                loc_id: stray_loc,
                ..record
            })
            .await
            .unwrap();
        let stray = checker.cross_check_history(item_id, &history).await.unwrap();
        assert_eq!(stray.len(), 1);
        assert_eq!(stray[0].location_id, stray_loc);
        assert_eq!(stray[0].expected, None);
    }
}
