use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use piwi_core::{DomainError, Entity, HolderId, ItemId, LocationId, MovementId, Quantity, ValueObject};

/// Per-location breakdown of a movement.
///
/// `moved` units left the location towards the holder; of those, some came
/// back (`returned`), were given away (`donated`) or disappeared (`lost`).
/// Whatever remains is still lent out: `lent = moved - donated - returned - lost`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementQuantities {
    pub moved: Quantity,
    pub returned: Quantity,
    pub donated: Quantity,
    pub lost: Quantity,
}

impl ValueObject for MovementQuantities {}

impl MovementQuantities {
    pub fn new(
        moved: Quantity,
        returned: Quantity,
        donated: Quantity,
        lost: Quantity,
    ) -> Result<Self, DomainError> {
        let q = Self {
            moved,
            returned,
            donated,
            lost,
        };
        q.validate()?;
        Ok(q)
    }

    /// Units no longer out with the holder: `returned + donated + lost`.
    fn accounted(&self) -> Result<Quantity, DomainError> {
        self.returned.try_add(self.donated)?.try_add(self.lost)
    }

    /// Units moved and still out with the holder.
    pub fn lent(&self) -> Result<Quantity, DomainError> {
        self.moved.try_sub(self.accounted()?)
    }

    /// No negative component, and no more returned/donated/lost than moved.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.moved.ensure_non_negative("moved")?;
        self.returned.ensure_non_negative("returned")?;
        self.donated.ensure_non_negative("donated")?;
        self.lost.ensure_non_negative("lost")?;
        let accounted = self.accounted()?;
        if accounted > self.moved {
            return Err(DomainError::invariant(format!(
                "returned + donated + lost ({accounted}) exceeds moved ({})",
                self.moved
            )));
        }
        Ok(())
    }

    /// Effect of this breakdown on availability (`returned - moved`).
    pub fn availability_delta(&self) -> Result<Quantity, DomainError> {
        self.returned.try_sub(self.moved)
    }

    /// Component-wise sum.
    pub fn try_add(&self, rhs: &MovementQuantities) -> Result<MovementQuantities, DomainError> {
        Ok(MovementQuantities {
            moved: self.moved.try_add(rhs.moved)?,
            returned: self.returned.try_add(rhs.returned)?,
            donated: self.donated.try_add(rhs.donated)?,
            lost: self.lost.try_add(rhs.lost)?,
        })
    }
}

/// A recorded displacement of item stock to a holder, split across locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub item_id: ItemId,
    pub holder_id: HolderId,
    pub date: DateTime<Utc>,
    pub lines: BTreeMap<LocationId, MovementQuantities>,
}

impl Movement {
    pub fn new(
        id: MovementId,
        item_id: ItemId,
        holder_id: HolderId,
        date: DateTime<Utc>,
        lines: BTreeMap<LocationId, MovementQuantities>,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("movement needs at least one location"));
        }
        for (loc, q) in &lines {
            q.validate()
                .map_err(|e| DomainError::validation(format!("location {loc}: {e}")))?;
        }
        let movement = Self {
            id,
            item_id,
            holder_id,
            date,
            lines,
        };
        movement.totals()?;
        Ok(movement)
    }

    /// Breakdown summed over all locations.
    pub fn totals(&self) -> Result<MovementQuantities, DomainError> {
        self.lines
            .values()
            .try_fold(MovementQuantities::default(), |acc, q| acc.try_add(q))
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
