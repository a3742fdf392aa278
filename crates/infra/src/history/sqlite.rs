//! SQLite-backed ledger store.
//!
//! The ledger table (`{prefix}movement_history`) is created lazily, the first
//! time any operation touches the store. Ids are stored as hyphenated UUID
//! text, dates as RFC 3339 UTC text with microsecond precision (so they sort
//! lexically), and quantities as decimal text. Decimal text does not sort
//! numerically in SQL, so queries ordered by a quantity column are sorted
//! (and limited) after loading, with the same exact ordering as the
//! in-memory store.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tokio::sync::OnceCell;
use tracing::instrument;

use piwi_core::Quantity;

use super::{
    HistoryColumn, HistoryEntry, HistoryErase, HistoryError, HistoryId, HistoryQuery,
    HistoryRecord, HistoryStore,
};

const TABLE_SUFFIX: &str = "movement_history";

const COLUMNS: &str = "ID, mov_id, item_id, loc_id, hold_id, date, moved, lent, donated, returned, lost";

#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
    table: Arc<str>,
    ready: Arc<OnceCell<()>>,
}

/// Ledger table name for `prefix`.
pub fn table_name(prefix: &str) -> Result<String, HistoryError> {
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(HistoryError::InvalidPrefix(prefix.to_string()));
    }
    Ok(format!("{prefix}{TABLE_SUFFIX}"))
}

impl SqliteHistoryStore {
    /// Wrap an existing pool. No SQL runs until the store is first used.
    pub fn new(pool: SqlitePool, prefix: &str) -> Result<Self, HistoryError> {
        Ok(Self {
            pool,
            table: table_name(prefix)?.into(),
            ready: Arc::new(OnceCell::new()),
        })
    }

    /// Open a pool for `database_url` (creating the database file if needed).
    ///
    /// An in-memory database lives as long as its connection, so those pools
    /// are pinned to a single connection that is never recycled.
    pub async fn connect(database_url: &str, prefix: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;
        Self::new(pool, prefix)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether the ledger table exists yet.
    pub async fn table_exists(&self) -> Result<bool, HistoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&*self.table)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn ensure_table(&self) -> Result<(), HistoryError> {
        self.ready
            .get_or_try_init(|| async {
                let ddl = format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS {table} (
                        ID       INTEGER PRIMARY KEY AUTOINCREMENT,
                        mov_id   TEXT NOT NULL,
                        item_id  TEXT NOT NULL,
                        loc_id   TEXT NOT NULL,
                        hold_id  TEXT NOT NULL,
                        date     TEXT NOT NULL,
                        moved    TEXT NOT NULL,
                        lent     TEXT NOT NULL,
                        donated  TEXT NOT NULL,
                        returned TEXT NOT NULL,
                        lost     TEXT NOT NULL
                    )
                    "#,
                    table = self.table
                );
                sqlx::query(&ddl).execute(&self.pool).await.inspect_err(|e| {
                    tracing::error!(error = %e, "failed to create movement history table");
                })?;
                tracing::info!("movement history table ready");
                Ok::<(), HistoryError>(())
            })
            .await?;
        Ok(())
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, HistoryError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let raw: String = row.try_get(name)?;
    raw.parse()
        .map_err(|e: T::Err| HistoryError::Corrupt(format!("{name} '{raw}': {e}")))
}

fn row_to_entry(row: &SqliteRow) -> Result<HistoryEntry, HistoryError> {
    let raw_date: String = row.try_get("date")?;
    let date = DateTime::parse_from_rfc3339(&raw_date)
        .map_err(|e| HistoryError::Corrupt(format!("date '{raw_date}': {e}")))?
        .with_timezone(&Utc);

    Ok(HistoryEntry {
        id: HistoryId(row.try_get("ID")?),
        mov_id: column(row, "mov_id")?,
        item_id: column(row, "item_id")?,
        loc_id: column(row, "loc_id")?,
        hold_id: column(row, "hold_id")?,
        date,
        moved: column::<Quantity>(row, "moved")?,
        lent: column::<Quantity>(row, "lent")?,
        donated: column::<Quantity>(row, "donated")?,
        returned: column::<Quantity>(row, "returned")?,
        lost: column::<Quantity>(row, "lost")?,
    })
}

fn push_in(
    qb: &mut QueryBuilder<'_, Sqlite>,
    has_where: &mut bool,
    column: HistoryColumn,
    values: Vec<String>,
) {
    if values.is_empty() {
        return;
    }
    qb.push(if *has_where { " AND " } else { " WHERE " });
    *has_where = true;
    qb.push(column.as_str()).push(" IN (");
    let mut list = qb.separated(", ");
    for value in values {
        list.push_bind(value);
    }
    list.push_unseparated(")");
}

fn strings<T: ToString>(values: &[T]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[async_trait::async_trait]
impl HistoryStore for SqliteHistoryStore {
    #[instrument(skip(self, record), fields(table = %self.table, mov_id = %record.mov_id))]
    async fn insert(&self, record: &HistoryRecord) -> Result<HistoryId, HistoryError> {
        let entry = HistoryEntry::from_record(HistoryId(0), record)?;
        self.ensure_table().await?;
        let sql = format!(
            "INSERT INTO {} (mov_id, item_id, loc_id, hold_id, date, moved, lent, donated, returned, lost) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(entry.mov_id.to_string())
            .bind(entry.item_id.to_string())
            .bind(entry.loc_id.to_string())
            .bind(entry.hold_id.to_string())
            .bind(format_date(&entry.date))
            .bind(entry.moved.to_string())
            .bind(entry.lent.to_string())
            .bind(entry.donated.to_string())
            .bind(entry.returned.to_string())
            .bind(entry.lost.to_string())
            .execute(&self.pool)
            .await?;
        Ok(HistoryId(result.last_insert_rowid()))
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn fetch(&self, id: HistoryId) -> Result<Option<HistoryEntry>, HistoryError> {
        self.ensure_table().await?;
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE ID = ?", self.table);
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    #[instrument(skip(self, entry), fields(table = %self.table, id = %entry.id))]
    async fn update(&self, entry: &HistoryEntry) -> Result<bool, HistoryError> {
        self.ensure_table().await?;
        let sql = format!(
            "UPDATE {} SET mov_id = ?, item_id = ?, loc_id = ?, hold_id = ?, date = ?, \
             moved = ?, lent = ?, donated = ?, returned = ?, lost = ? WHERE ID = ?",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(entry.mov_id.to_string())
            .bind(entry.item_id.to_string())
            .bind(entry.loc_id.to_string())
            .bind(entry.hold_id.to_string())
            .bind(format_date(&entry.date))
            .bind(entry.moved.to_string())
            .bind(entry.lent.to_string())
            .bind(entry.donated.to_string())
            .bind(entry.returned.to_string())
            .bind(entry.lost.to_string())
            .bind(entry.id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter), fields(table = %self.table, logic = ?filter.logic))]
    async fn erase(&self, filter: &HistoryErase) -> Result<u64, HistoryError> {
        filter.ensure_not_empty()?;
        self.ensure_table().await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE ", self.table));
        let mut conditions = qb.separated(filter.logic.as_sql());
        for condition in &filter.conditions {
            conditions.push(format!("{} = ", condition.column()));
            conditions.push_bind_unseparated(condition.value());
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, query), fields(table = %self.table))]
    async fn get(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, HistoryError> {
        self.ensure_table().await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
        let mut has_where = false;
        push_in(&mut qb, &mut has_where, HistoryColumn::MovId, strings(&query.mov_ids));
        push_in(&mut qb, &mut has_where, HistoryColumn::ItemId, strings(&query.item_ids));
        push_in(&mut qb, &mut has_where, HistoryColumn::LocId, strings(&query.loc_ids));
        push_in(&mut qb, &mut has_where, HistoryColumn::HoldId, strings(&query.hold_ids));

        let exact = query.order_by.is_quantity();
        if !exact {
            let order = query.order.as_sql();
            qb.push(format!(" ORDER BY {} {order}, ID {order}", query.order_by));
            if let Some(limit) = query.limit {
                qb.push(" LIMIT ").push_bind(i64::from(limit));
            }
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut entries = rows.iter().map(row_to_entry).collect::<Result<Vec<_>, _>>()?;
        if exact {
            query.sort(&mut entries);
            if let Some(limit) = query.limit {
                entries.truncate(limit as usize);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryCondition, Logic, SortOrder};
    use piwi_core::{HolderId, ItemId, LocationId, MovementId};
    use piwi_inventory::MovementQuantities;

    async fn store() -> SqliteHistoryStore {
        SqliteHistoryStore::connect("sqlite::memory:", "piwi_").await.unwrap()
    }

    fn record(mov_id: MovementId, item_id: ItemId, moved: i64, returned: i64) -> HistoryRecord {
        HistoryRecord {
            mov_id,
            item_id,
            loc_id: LocationId::new(),
            hold_id: HolderId::new(),
            date: Utc::now(),
            quantities: MovementQuantities::new(
                Quantity::units(moved),
                Quantity::units(returned),
                Quantity::ZERO,
                Quantity::ZERO,
            )
            .unwrap(),
        }
    }

    #[test]
    fn prefix_is_validated() {
        assert_eq!(table_name("wp_3_").unwrap(), "wp_3_movement_history");
        assert_eq!(table_name("").unwrap(), "movement_history");
        assert!(matches!(
            table_name("x; DROP TABLE y"),
            Err(HistoryError::InvalidPrefix(_))
        ));
    }

    #[tokio::test]
    async fn table_is_created_on_first_use() {
        let store = store().await;
        assert!(!store.table_exists().await.unwrap());

        let rows = store.get(&HistoryQuery::new()).await.unwrap();
        assert!(rows.is_empty());
        assert!(store.table_exists().await.unwrap());
    }

    #[tokio::test]
    async fn insert_fetch_and_update() {
        let store = store().await;
        let id = store
            .insert(&record(MovementId::new(), ItemId::new(), 4, 1))
            .await
            .unwrap();

        let mut entry = store.fetch(id).await.unwrap().unwrap();
        assert_eq!(entry.lent, Quantity::units(3));

        entry.returned = Quantity::units(4);
        entry.lent = entry.quantities().lent().unwrap();
        assert!(store.update(&entry).await.unwrap());
        assert_eq!(store.fetch(id).await.unwrap().unwrap(), entry);

        entry.id = HistoryId(999);
        assert!(!store.update(&entry).await.unwrap());
    }

    #[tokio::test]
    async fn decimal_quantities_survive_storage() {
        let store = store().await;
        let mut rec = record(MovementId::new(), ItemId::new(), 0, 0);
        rec.quantities.moved = "2.5".parse().unwrap();
        rec.quantities.returned = "0.25".parse().unwrap();

        let id = store.insert(&rec).await.unwrap();
        let entry = store.fetch(id).await.unwrap().unwrap();
        assert_eq!(entry.lent, "2.25".parse::<Quantity>().unwrap());
    }

    #[tokio::test]
    async fn erase_with_or_removes_either_match() {
        let store = store().await;
        let (m1, m2) = (MovementId::new(), MovementId::new());
        let item = ItemId::new();

        store.insert(&record(m1, ItemId::new(), 1, 0)).await.unwrap();
        store.insert(&record(m2, item, 1, 0)).await.unwrap();
        store.insert(&record(MovementId::new(), ItemId::new(), 1, 0)).await.unwrap();

        let filter = HistoryErase::new(Logic::Or)
            .with(HistoryCondition::MovId(m1))
            .with(HistoryCondition::ItemId(item));
        assert_eq!(store.erase(&filter).await.unwrap(), 2);
        assert_eq!(store.get(&HistoryQuery::new()).await.unwrap().len(), 1);

        let and = HistoryErase::new(Logic::And)
            .with(HistoryCondition::MovId(m1))
            .with(HistoryCondition::ItemId(item));
        assert_eq!(store.erase(&and).await.unwrap(), 0);

        assert!(matches!(
            store.erase(&HistoryErase::default()).await,
            Err(HistoryError::EmptyFilter)
        ));
    }

    #[tokio::test]
    async fn get_filters_orders_and_limits() {
        let store = store().await;
        let item = ItemId::new();
        let mov = MovementId::new();

        for moved in [3, 10, 1] {
            store.insert(&record(mov, item, moved, 0)).await.unwrap();
        }
        store.insert(&record(mov, ItemId::new(), 7, 0)).await.unwrap();

        let by_date = store.get(&HistoryQuery::new().item_id(item)).await.unwrap();
        let moved: Vec<Quantity> = by_date.iter().map(|e| e.moved).collect();
        assert_eq!(moved, [3, 10, 1].map(Quantity::units));

        let biggest = store
            .get(
                &HistoryQuery::new()
                    .mov_id(mov)
                    .order_by(HistoryColumn::Moved, SortOrder::Desc)
                    .limit(2),
            )
            .await
            .unwrap();
        let moved: Vec<Quantity> = biggest.iter().map(|e| e.moved).collect();
        assert_eq!(moved, [10, 7].map(Quantity::units));
    }

    #[tokio::test]
    async fn quantity_order_is_exact_beyond_float_precision() {
        let store = store().await;
        let memory = crate::history::InMemoryHistoryStore::new();
        let item = ItemId::new();

        for moved in ["1.0000000000000000000000000002", "1.0000000000000000000000000001", "0.5"] {
            let mut rec = record(MovementId::new(), item, 0, 0);
            rec.quantities.moved = moved.parse().unwrap();
            store.insert(&rec).await.unwrap();
            memory.insert(&rec).await.unwrap();
        }

        let query = HistoryQuery::new()
            .item_id(item)
            .order_by(HistoryColumn::Moved, SortOrder::Asc)
            .limit(2);
        let from_sqlite: Vec<Quantity> = store.get(&query).await.unwrap().iter().map(|e| e.moved).collect();
        let from_memory: Vec<Quantity> = memory.get(&query).await.unwrap().iter().map(|e| e.moved).collect();

        assert_eq!(
            from_sqlite,
            ["0.5", "1.0000000000000000000000000001"].map(|q| q.parse::<Quantity>().unwrap())
        );
        assert_eq!(from_sqlite, from_memory);
    }
}
