use std::collections::BTreeMap;

use tracing::instrument;

use piwi_core::{HolderId, ItemId, Quantity};

use crate::repository::InventoryRepository;

use super::{
    HistoryEntry, HistoryErase, HistoryError, HistoryId, HistoryQuery, HistoryRecord,
    HistoryStore, HistoryUpdate,
};

/// Validating front of a [`HistoryStore`].
///
/// Every row written through here references an existing movement, item,
/// location and holder, carries non-negative quantities, and has `lent`
/// derived from the other quantities. A rejected write leaves the store
/// untouched.
#[derive(Debug, Clone)]
pub struct MovementHistory<H, R> {
    store: H,
    repo: R,
}

impl<H, R> MovementHistory<H, R>
where
    H: HistoryStore,
    R: InventoryRepository,
{
    pub fn new(store: H, repo: R) -> Self {
        Self { store, repo }
    }

    pub fn store(&self) -> &H {
        &self.store
    }

    fn check_references(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        fn missing(column: &'static str, value: impl ToString) -> HistoryError {
            HistoryError::InvalidReference {
                column,
                value: value.to_string(),
            }
        }

        if self.repo.movement(entry.mov_id).is_none() {
            return Err(missing("mov_id", entry.mov_id));
        }
        if self.repo.item(entry.item_id).is_none() {
            return Err(missing("item_id", entry.item_id));
        }
        if self.repo.location(entry.loc_id).is_none() {
            return Err(missing("loc_id", entry.loc_id));
        }
        if self.repo.holder(entry.hold_id).is_none() {
            return Err(missing("hold_id", entry.hold_id));
        }
        Ok(())
    }

    fn validate(&self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        self.check_references(entry)?;
        entry.quantities().validate()?;
        Ok(())
    }

    /// Record one (movement, location) row and return its id.
    #[instrument(skip(self, record), fields(mov_id = %record.mov_id, loc_id = %record.loc_id))]
    pub async fn insert(&self, record: HistoryRecord) -> Result<HistoryId, HistoryError> {
        let candidate = record
            .quantities
            .validate()
            .map_err(HistoryError::from)
            .and_then(|()| HistoryEntry::from_record(HistoryId(0), &record))
            .and_then(|entry| self.validate(&entry).map(|()| entry))
            .inspect_err(|e| {
                tracing::warn!(error = %e, "rejected movement history row");
            })?;

        let id = self.store.insert(&record).await?;
        tracing::debug!(%id, lent = %candidate.lent, "movement history row recorded");
        Ok(id)
    }

    /// Apply `update` to row `id`, re-validating the resulting row.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: HistoryId, update: &HistoryUpdate) -> Result<HistoryEntry, HistoryError> {
        let current = self
            .store
            .fetch(id)
            .await?
            .ok_or(HistoryError::NotFound(id))?;

        let updated = update
            .apply_to(&current)
            .and_then(|entry| self.validate(&entry).map(|()| entry))
            .inspect_err(|e| {
                tracing::warn!(error = %e, "rejected movement history update");
            })?;

        if !self.store.update(&updated).await? {
            return Err(HistoryError::NotFound(id));
        }
        Ok(updated)
    }

    /// Update row `id` from raw `(column, value)` pairs.
    pub async fn update_fields<I, K, V>(&self, id: HistoryId, fields: I) -> Result<HistoryEntry, HistoryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let update = HistoryUpdate::from_fields(fields).inspect_err(|e| {
            tracing::warn!(%id, error = %e, "rejected movement history update");
        })?;
        self.update(id, &update).await
    }

    #[instrument(skip(self, filter))]
    pub async fn erase(&self, filter: &HistoryErase) -> Result<u64, HistoryError> {
        let removed = self.store.erase(filter).await?;
        tracing::info!(removed, "movement history rows erased");
        Ok(removed)
    }

    pub async fn get(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, HistoryError> {
        self.store.get(query).await
    }

    /// Units each item still has out with `holder`, per the ledger.
    /// Items with nothing outstanding are omitted.
    pub async fn lent_by_holder(&self, holder: HolderId) -> Result<BTreeMap<ItemId, Quantity>, HistoryError> {
        let rows = self.store.get(&HistoryQuery::new().hold_id(holder)).await?;
        let mut out: BTreeMap<ItemId, Quantity> = BTreeMap::new();
        for row in rows {
            let slot = out.entry(row.item_id).or_default();
            *slot = slot.try_add(row.lent)?;
        }
        out.retain(|_, q| !q.is_zero());
        Ok(out)
    }
}
