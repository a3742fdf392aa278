//! Movement history ledger.
//!
//! One row per (movement, location) pair, recording how many units were
//! moved to a holder and what became of them. `lent` is always derived:
//! `lent = moved - donated - returned - lost`, and never accepted as input.
//!
//! Stores (`HistoryStore`) only persist rows; reference and quantity
//! validation lives in [`MovementHistory`].

pub mod in_memory;
pub mod ledger;
pub mod sqlite;

pub use in_memory::InMemoryHistoryStore;
pub use ledger::MovementHistory;
pub use sqlite::SqliteHistoryStore;

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use piwi_core::{DomainError, HolderId, ItemId, LocationId, MovementId, Quantity};
use piwi_inventory::MovementQuantities;

/// Row id assigned by the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryId(pub i64);

impl core::fmt::Display for HistoryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{column} {value} does not reference an existing record")]
    InvalidReference { column: &'static str, value: String },

    #[error("unknown history column: {0}")]
    UnknownColumn(String),

    #[error("history column {0} cannot be written")]
    ReadOnlyColumn(&'static str),

    #[error("invalid value for {column}: {reason}")]
    InvalidValue { column: &'static str, reason: String },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("erase filter must name at least one condition")]
    EmptyFilter,

    #[error("history row {0} not found")]
    NotFound(HistoryId),

    #[error("invalid table prefix '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidPrefix(String),

    #[error("corrupt history row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// A ledger row to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub mov_id: MovementId,
    pub item_id: ItemId,
    pub loc_id: LocationId,
    pub hold_id: HolderId,
    pub date: DateTime<Utc>,
    pub quantities: MovementQuantities,
}

/// A stored ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub mov_id: MovementId,
    pub item_id: ItemId,
    pub loc_id: LocationId,
    pub hold_id: HolderId,
    pub date: DateTime<Utc>,
    pub moved: Quantity,
    pub lent: Quantity,
    pub donated: Quantity,
    pub returned: Quantity,
    pub lost: Quantity,
}

impl HistoryEntry {
    /// Fails when `lent` cannot be derived (the quantities leave the valid range).
    pub fn from_record(id: HistoryId, record: &HistoryRecord) -> Result<Self, HistoryError> {
        let q = record.quantities;
        Ok(Self {
            id,
            mov_id: record.mov_id,
            item_id: record.item_id,
            loc_id: record.loc_id,
            hold_id: record.hold_id,
            date: record.date,
            moved: q.moved,
            lent: q.lent()?,
            donated: q.donated,
            returned: q.returned,
            lost: q.lost,
        })
    }

    pub fn quantities(&self) -> MovementQuantities {
        MovementQuantities {
            moved: self.moved,
            returned: self.returned,
            donated: self.donated,
            lost: self.lost,
        }
    }

    fn compare_by(&self, other: &Self, column: HistoryColumn) -> Ordering {
        match column {
            HistoryColumn::Id => self.id.cmp(&other.id),
            HistoryColumn::MovId => self.mov_id.cmp(&other.mov_id),
            HistoryColumn::ItemId => self.item_id.cmp(&other.item_id),
            HistoryColumn::LocId => self.loc_id.cmp(&other.loc_id),
            HistoryColumn::HoldId => self.hold_id.cmp(&other.hold_id),
            HistoryColumn::Date => self.date.cmp(&other.date),
            HistoryColumn::Moved => self.moved.cmp(&other.moved),
            HistoryColumn::Lent => self.lent.cmp(&other.lent),
            HistoryColumn::Donated => self.donated.cmp(&other.donated),
            HistoryColumn::Returned => self.returned.cmp(&other.returned),
            HistoryColumn::Lost => self.lost.cmp(&other.lost),
        }
    }
}

/// Ledger table columns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryColumn {
    Id,
    MovId,
    ItemId,
    LocId,
    HoldId,
    Date,
    Moved,
    Lent,
    Donated,
    Returned,
    Lost,
}

impl HistoryColumn {
    pub const ALL: [HistoryColumn; 11] = [
        HistoryColumn::Id,
        HistoryColumn::MovId,
        HistoryColumn::ItemId,
        HistoryColumn::LocId,
        HistoryColumn::HoldId,
        HistoryColumn::Date,
        HistoryColumn::Moved,
        HistoryColumn::Lent,
        HistoryColumn::Donated,
        HistoryColumn::Returned,
        HistoryColumn::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryColumn::Id => "ID",
            HistoryColumn::MovId => "mov_id",
            HistoryColumn::ItemId => "item_id",
            HistoryColumn::LocId => "loc_id",
            HistoryColumn::HoldId => "hold_id",
            HistoryColumn::Date => "date",
            HistoryColumn::Moved => "moved",
            HistoryColumn::Lent => "lent",
            HistoryColumn::Donated => "donated",
            HistoryColumn::Returned => "returned",
            HistoryColumn::Lost => "lost",
        }
    }

    /// `ID` is assigned by the store and `lent` is derived.
    pub fn is_updatable(&self) -> bool {
        !matches!(self, HistoryColumn::Id | HistoryColumn::Lent)
    }

    pub fn is_quantity(&self) -> bool {
        matches!(
            self,
            HistoryColumn::Moved
                | HistoryColumn::Lent
                | HistoryColumn::Donated
                | HistoryColumn::Returned
                | HistoryColumn::Lost
        )
    }
}

impl FromStr for HistoryColumn {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HistoryColumn::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| HistoryError::UnknownColumn(s.to_string()))
    }
}

impl core::fmt::Display for HistoryColumn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_value<T>(column: HistoryColumn, value: &str) -> Result<T, HistoryError>
where
    T: FromStr<Err = DomainError>,
{
    value.parse().map_err(|e: DomainError| HistoryError::InvalidValue {
        column: column.as_str(),
        reason: e.to_string(),
    })
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| HistoryError::InvalidValue {
            column: HistoryColumn::Date.as_str(),
            reason: e.to_string(),
        })
}

/// Partial update of a ledger row. Unset fields are left as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryUpdate {
    pub mov_id: Option<MovementId>,
    pub item_id: Option<ItemId>,
    pub loc_id: Option<LocationId>,
    pub hold_id: Option<HolderId>,
    pub date: Option<DateTime<Utc>>,
    pub moved: Option<Quantity>,
    pub donated: Option<Quantity>,
    pub returned: Option<Quantity>,
    pub lost: Option<Quantity>,
}

impl HistoryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mov_id(mut self, id: MovementId) -> Self {
        self.mov_id = Some(id);
        self
    }

    pub fn item_id(mut self, id: ItemId) -> Self {
        self.item_id = Some(id);
        self
    }

    pub fn loc_id(mut self, id: LocationId) -> Self {
        self.loc_id = Some(id);
        self
    }

    pub fn hold_id(mut self, id: HolderId) -> Self {
        self.hold_id = Some(id);
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn moved(mut self, q: Quantity) -> Self {
        self.moved = Some(q);
        self
    }

    pub fn donated(mut self, q: Quantity) -> Self {
        self.donated = Some(q);
        self
    }

    pub fn returned(mut self, q: Quantity) -> Self {
        self.returned = Some(q);
        self
    }

    pub fn lost(mut self, q: Quantity) -> Self {
        self.lost = Some(q);
        self
    }

    /// Build an update from raw `(column, value)` pairs, as posted by a form.
    ///
    /// Any unknown or non-writable column rejects the whole update.
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, HistoryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut update = Self::new();
        for (name, value) in fields {
            let column: HistoryColumn = name.as_ref().parse()?;
            if !column.is_updatable() {
                return Err(HistoryError::ReadOnlyColumn(column.as_str()));
            }
            let value = value.as_ref();
            match column {
                HistoryColumn::MovId => update.mov_id = Some(parse_value(column, value)?),
                HistoryColumn::ItemId => update.item_id = Some(parse_value(column, value)?),
                HistoryColumn::LocId => update.loc_id = Some(parse_value(column, value)?),
                HistoryColumn::HoldId => update.hold_id = Some(parse_value(column, value)?),
                HistoryColumn::Date => update.date = Some(parse_date(value)?),
                HistoryColumn::Moved => update.moved = Some(parse_value(column, value)?),
                HistoryColumn::Donated => update.donated = Some(parse_value(column, value)?),
                HistoryColumn::Returned => update.returned = Some(parse_value(column, value)?),
                HistoryColumn::Lost => update.lost = Some(parse_value(column, value)?),
                HistoryColumn::Id | HistoryColumn::Lent => {
                    return Err(HistoryError::ReadOnlyColumn(column.as_str()));
                }
            }
        }
        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The row as it would read after this update, with `lent` recomputed.
    pub fn apply_to(&self, entry: &HistoryEntry) -> Result<HistoryEntry, HistoryError> {
        let quantities = MovementQuantities {
            moved: self.moved.unwrap_or(entry.moved),
            returned: self.returned.unwrap_or(entry.returned),
            donated: self.donated.unwrap_or(entry.donated),
            lost: self.lost.unwrap_or(entry.lost),
        };
        Ok(HistoryEntry {
            id: entry.id,
            mov_id: self.mov_id.unwrap_or(entry.mov_id),
            item_id: self.item_id.unwrap_or(entry.item_id),
            loc_id: self.loc_id.unwrap_or(entry.loc_id),
            hold_id: self.hold_id.unwrap_or(entry.hold_id),
            date: self.date.unwrap_or(entry.date),
            moved: quantities.moved,
            lent: quantities.lent()?,
            donated: quantities.donated,
            returned: quantities.returned,
            lost: quantities.lost,
        })
    }
}

/// How erase conditions combine.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Logic {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Logic::And => " AND ",
            Logic::Or => " OR ",
        }
    }
}

impl FromStr for Logic {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Logic::And),
            "OR" => Ok(Logic::Or),
            _ => Err(HistoryError::InvalidValue {
                column: "logic",
                reason: format!("expected AND or OR, got '{s}'"),
            }),
        }
    }
}

/// Equality on one id column.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HistoryCondition {
    MovId(MovementId),
    ItemId(ItemId),
    LocId(LocationId),
    HoldId(HolderId),
}

impl HistoryCondition {
    pub fn column(&self) -> HistoryColumn {
        match self {
            HistoryCondition::MovId(_) => HistoryColumn::MovId,
            HistoryCondition::ItemId(_) => HistoryColumn::ItemId,
            HistoryCondition::LocId(_) => HistoryColumn::LocId,
            HistoryCondition::HoldId(_) => HistoryColumn::HoldId,
        }
    }

    /// Value as stored in the id column.
    pub fn value(&self) -> String {
        match self {
            HistoryCondition::MovId(id) => id.to_string(),
            HistoryCondition::ItemId(id) => id.to_string(),
            HistoryCondition::LocId(id) => id.to_string(),
            HistoryCondition::HoldId(id) => id.to_string(),
        }
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        match self {
            HistoryCondition::MovId(id) => entry.mov_id == *id,
            HistoryCondition::ItemId(id) => entry.item_id == *id,
            HistoryCondition::LocId(id) => entry.loc_id == *id,
            HistoryCondition::HoldId(id) => entry.hold_id == *id,
        }
    }
}

/// Filter for [`HistoryStore::erase`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryErase {
    pub logic: Logic,
    pub conditions: Vec<HistoryCondition>,
}

impl HistoryErase {
    pub fn new(logic: Logic) -> Self {
        Self {
            logic,
            conditions: Vec::new(),
        }
    }

    pub fn with(mut self, condition: HistoryCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Build a filter from `(column, value)` pairs; a `logic` pair selects
    /// `AND` (default) or `OR`. Only the id columns may be filtered on.
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, HistoryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filter = Self::default();
        for (name, value) in fields {
            let (name, value) = (name.as_ref(), value.as_ref());
            if name.eq_ignore_ascii_case("logic") {
                filter.logic = value.parse()?;
                continue;
            }
            let column: HistoryColumn = name.parse()?;
            let condition = match column {
                HistoryColumn::MovId => HistoryCondition::MovId(parse_value(column, value)?),
                HistoryColumn::ItemId => HistoryCondition::ItemId(parse_value(column, value)?),
                HistoryColumn::LocId => HistoryCondition::LocId(parse_value(column, value)?),
                HistoryColumn::HoldId => HistoryCondition::HoldId(parse_value(column, value)?),
                _ => return Err(HistoryError::UnknownColumn(name.to_string())),
            };
            filter.conditions.push(condition);
        }
        filter.ensure_not_empty()?;
        Ok(filter)
    }

    pub fn ensure_not_empty(&self) -> Result<(), HistoryError> {
        if self.conditions.is_empty() {
            return Err(HistoryError::EmptyFilter);
        }
        Ok(())
    }

    /// An empty filter matches nothing.
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        match self.logic {
            Logic::And => self.conditions.iter().all(|c| c.matches(entry)),
            Logic::Or => self.conditions.iter().any(|c| c.matches(entry)),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter for [`HistoryStore::get`].
///
/// Values are OR-combined within a column, columns are AND-combined; an
/// empty list leaves its column unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub mov_ids: Vec<MovementId>,
    pub item_ids: Vec<ItemId>,
    pub loc_ids: Vec<LocationId>,
    pub hold_ids: Vec<HolderId>,
    pub order_by: HistoryColumn,
    pub order: SortOrder,
    pub limit: Option<u32>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            mov_ids: Vec::new(),
            item_ids: Vec::new(),
            loc_ids: Vec::new(),
            hold_ids: Vec::new(),
            order_by: HistoryColumn::Date,
            order: SortOrder::Asc,
            limit: None,
        }
    }
}

impl HistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mov_id(mut self, id: MovementId) -> Self {
        self.mov_ids.push(id);
        self
    }

    pub fn item_id(mut self, id: ItemId) -> Self {
        self.item_ids.push(id);
        self
    }

    pub fn loc_id(mut self, id: LocationId) -> Self {
        self.loc_ids.push(id);
        self
    }

    pub fn hold_id(mut self, id: HolderId) -> Self {
        self.hold_ids.push(id);
        self
    }

    pub fn order_by(mut self, column: HistoryColumn, order: SortOrder) -> Self {
        self.order_by = column;
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        fn within<T: PartialEq>(allowed: &[T], value: &T) -> bool {
            allowed.is_empty() || allowed.contains(value)
        }
        within(&self.mov_ids, &entry.mov_id)
            && within(&self.item_ids, &entry.item_id)
            && within(&self.loc_ids, &entry.loc_id)
            && within(&self.hold_ids, &entry.hold_id)
    }

    /// Sort `entries` by the query order; ties fall back to row id.
    pub fn sort(&self, entries: &mut [HistoryEntry]) {
        entries.sort_by(|a, b| {
            let ord = a.compare_by(b, self.order_by).then(a.id.cmp(&b.id));
            match self.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }
}

/// Persistence for ledger rows.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a row; `lent` is derived from the record's quantities.
    async fn insert(&self, record: &HistoryRecord) -> Result<HistoryId, HistoryError>;

    async fn fetch(&self, id: HistoryId) -> Result<Option<HistoryEntry>, HistoryError>;

    /// Overwrite the stored row with `entry.id`. Returns `false` when no such row exists.
    async fn update(&self, entry: &HistoryEntry) -> Result<bool, HistoryError>;

    /// Delete matching rows, returning how many were removed.
    async fn erase(&self, filter: &HistoryErase) -> Result<u64, HistoryError>;

    async fn get(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, HistoryError>;
}

#[async_trait::async_trait]
impl<S> HistoryStore for std::sync::Arc<S>
where
    S: HistoryStore + ?Sized,
{
    async fn insert(&self, record: &HistoryRecord) -> Result<HistoryId, HistoryError> {
        (**self).insert(record).await
    }

    async fn fetch(&self, id: HistoryId) -> Result<Option<HistoryEntry>, HistoryError> {
        (**self).fetch(id).await
    }

    async fn update(&self, entry: &HistoryEntry) -> Result<bool, HistoryError> {
        (**self).update(entry).await
    }

    async fn erase(&self, filter: &HistoryErase) -> Result<u64, HistoryError> {
        (**self).erase(filter).await
    }

    async fn get(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>, HistoryError> {
        (**self).get(query).await
    }
}
