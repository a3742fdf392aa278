use std::sync::RwLock;

use super::{HistoryEntry, HistoryErase, HistoryError, HistoryId, HistoryQuery, HistoryRecord, HistoryStore};

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    entries: Vec<HistoryEntry>,
}

/// In-memory ledger for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    inner: RwLock<Rows>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|rows| rows.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> HistoryError {
    HistoryError::Corrupt("history store lock poisoned".to_string())
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert(&self, record: &HistoryRecord) -> Result<HistoryId, HistoryError> {
        let mut rows = self.inner.write().map_err(|_| poisoned())?;
        let id = HistoryId(rows.next_id + 1);
        let entry = HistoryEntry::from_record(id, record)?;
        rows.next_id = id.0;
        rows.entries.push(entry);
        Ok(id)
    }

    async fn fetch(&self, id: HistoryId) -> Result<Option<HistoryEntry>, HistoryError> {
        let rows = self.inner.read().map_err(|_| poisoned())?;
        Ok(rows.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn update(&self, entry: &HistoryEntry) -> Result<bool, HistoryError> {
        let mut rows = self.inner.write().map_err(|_| poisoned())?;
        match rows.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn erase(&self, filter: &HistoryErase) -> Result<u64, HistoryError> {
        filter.ensure_not_empty()?;
        let mut rows = self.inner.write().map_err(|_| poisoned())?;
        let before = rows.entries.len();
        rows.entries.retain(|e| !filter.matches(e));
        Ok((before - rows.entries.len()) as u64)
    }

    async fn get(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut out: Vec<HistoryEntry> = {
            let rows = self.inner.read().map_err(|_| poisoned())?;
            rows.entries.iter().filter(|e| query.matches(e)).cloned().collect()
        };
        query.sort(&mut out);
        if let Some(limit) = query.limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use piwi_core::{HolderId, ItemId, LocationId, MovementId, Quantity};
    use piwi_inventory::MovementQuantities;

    use super::*;

    fn record(mov_id: MovementId, loc_id: LocationId) -> HistoryRecord {
        HistoryRecord {
            mov_id,
            item_id: ItemId::new(),
            loc_id,
            hold_id: HolderId::new(),
            date: Utc::now(),
            quantities: MovementQuantities {
                moved: Quantity::units(1),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn erase_mov_id_or_loc_id() {
        let store = InMemoryHistoryStore::new();
        let (x, y) = (MovementId::new(), LocationId::new());

        store.insert(&record(x, LocationId::new())).await.unwrap();
        store.insert(&record(x, y)).await.unwrap();
        store.insert(&record(MovementId::new(), y)).await.unwrap();
        let kept = store.insert(&record(MovementId::new(), LocationId::new())).await.unwrap();

        let filter = HistoryErase::from_fields([
            ("mov_id", x.to_string()),
            ("logic", "OR".to_string()),
            ("loc_id", y.to_string()),
        ])
        .unwrap();

        assert_eq!(store.erase(&filter).await.unwrap(), 3);
        assert_eq!(store.erase(&filter).await.unwrap(), 0);

        let left = store.get(&HistoryQuery::new()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, kept);
    }

    #[tokio::test]
    async fn underivable_lent_writes_nothing() {
        let store = InMemoryHistoryStore::new();
        let mut bad = record(MovementId::new(), LocationId::new());
        bad.quantities.returned = Quantity::MAX;
        bad.quantities.donated = Quantity::MAX;

        assert!(matches!(store.insert(&bad).await, Err(HistoryError::Domain(_))));
        assert!(store.is_empty());
        let first = store.insert(&record(MovementId::new(), LocationId::new())).await.unwrap();
        assert_eq!(first, HistoryId(1));
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let store = InMemoryHistoryStore::new();
        let mov = MovementId::new();
        let first = store.insert(&record(mov, LocationId::new())).await.unwrap();
        store
            .erase(&HistoryErase::new(crate::history::Logic::And).with(crate::history::HistoryCondition::MovId(mov)))
            .await
            .unwrap();
        let second = store.insert(&record(mov, LocationId::new())).await.unwrap();
        assert!(second > first);
    }
}
