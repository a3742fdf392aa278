use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use piwi_core::{DomainError, Entity, ItemId, LocationId, PurchaseId, Quantity};

/// A recorded acquisition of item stock, split across locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub item_id: ItemId,
    pub date: DateTime<Utc>,
    pub lines: BTreeMap<LocationId, Quantity>,
}

impl Purchase {
    /// Every line must carry a strictly positive quantity, and there must be
    /// at least one line.
    pub fn new(
        id: PurchaseId,
        item_id: ItemId,
        date: DateTime<Utc>,
        lines: BTreeMap<LocationId, Quantity>,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("purchase needs at least one location"));
        }
        if let Some((loc, qty)) = lines.iter().find(|(_, q)| q.is_negative() || q.is_zero()) {
            return Err(DomainError::validation(format!(
                "purchase quantity at location {loc} must be positive (got {qty})"
            )));
        }
        let purchase = Self {
            id,
            item_id,
            date,
            lines,
        };
        purchase.total()?;
        Ok(purchase)
    }

    /// Units acquired across all locations.
    pub fn total(&self) -> Result<Quantity, DomainError> {
        self.lines.values().try_fold(Quantity::ZERO, |acc, q| acc.try_add(*q))
    }
}

impl Entity for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
