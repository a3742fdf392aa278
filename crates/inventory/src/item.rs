use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use piwi_core::{Aggregate, AggregateRoot, DomainError, ItemId, MovementId, PurchaseId, Quantity};
use piwi_events::Event;

/// Aggregate root: Item.
///
/// `amount` (total ever acquired) and `avail` (current free stock) are the
/// stored totals. They are maintained incrementally as purchases and
/// movements are recorded, and are audited by replaying the history
/// (see `consistency`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    amount: Quantity,
    avail: Quantity,
    version: u64,
    created: bool,
}

impl Item {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            name: String::new(),
            amount: Quantity::ZERO,
            avail: Quantity::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn amount(&self) -> Quantity {
        self.amount
    }

    pub fn avail(&self) -> Quantity {
        self.avail
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub item_id: ItemId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPurchase (stock acquired into the warehouse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPurchase {
    pub item_id: ItemId,
    pub purchase_id: PurchaseId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement (stock out to a holder, some of it back).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub item_id: ItemId,
    pub movement_id: MovementId,
    pub moved: Quantity,
    pub returned: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: OverrideTotals (manual correction of the stored totals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideTotals {
    pub item_id: ItemId,
    pub amount: Quantity,
    pub avail: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCommand {
    CreateItem(CreateItem),
    RecordPurchase(RecordPurchase),
    RecordMovement(RecordMovement),
    OverrideTotals(OverrideTotals),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: ItemId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub item_id: ItemId,
    pub purchase_id: PurchaseId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub item_id: ItemId,
    pub movement_id: MovementId,
    pub moved: Quantity,
    pub returned: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TotalsOverridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsOverridden {
    pub item_id: ItemId,
    pub amount: Quantity,
    pub avail: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEvent {
    ItemCreated(ItemCreated),
    StockReceived(StockReceived),
    StockMoved(StockMoved),
    TotalsOverridden(TotalsOverridden),
}

impl Event for ItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ItemEvent::ItemCreated(_) => "inventory.item.created",
            ItemEvent::StockReceived(_) => "inventory.item.stock_received",
            ItemEvent::StockMoved(_) => "inventory.item.stock_moved",
            ItemEvent::TotalsOverridden(_) => "inventory.item.totals_overridden",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ItemEvent::ItemCreated(e) => e.occurred_at,
            ItemEvent::StockReceived(e) => e.occurred_at,
            ItemEvent::StockMoved(e) => e.occurred_at,
            ItemEvent::TotalsOverridden(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Item {
    type Command = ItemCommand;
    type Event = ItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ItemEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.name = e.name.clone();
                self.amount = Quantity::ZERO;
                self.avail = Quantity::ZERO;
                self.created = true;
            }
            // Resulting totals are range-checked in `handle`.
            ItemEvent::StockReceived(e) => {
                self.amount += e.quantity;
                self.avail += e.quantity;
            }
            ItemEvent::StockMoved(e) => {
                self.avail += e.returned - e.moved;
            }
            ItemEvent::TotalsOverridden(e) => {
                self.amount = e.amount;
                self.avail = e.avail;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ItemCommand::CreateItem(cmd) => self.handle_create(cmd),
            ItemCommand::RecordPurchase(cmd) => self.handle_purchase(cmd),
            ItemCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            ItemCommand::OverrideTotals(cmd) => self.handle_override(cmd),
        }
    }
}

impl Item {
    fn ensure_existing(&self, item_id: ItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<ItemEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![ItemEvent::ItemCreated(ItemCreated {
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_purchase(&self, cmd: &RecordPurchase) -> Result<Vec<ItemEvent>, DomainError> {
        self.ensure_existing(cmd.item_id)?;

        if cmd.quantity.is_zero() || cmd.quantity.is_negative() {
            return Err(DomainError::validation("purchased quantity must be positive"));
        }
        self.amount.try_add(cmd.quantity)?;
        self.avail.try_add(cmd.quantity)?;

        Ok(vec![ItemEvent::StockReceived(StockReceived {
            item_id: cmd.item_id,
            purchase_id: cmd.purchase_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<ItemEvent>, DomainError> {
        self.ensure_existing(cmd.item_id)?;
        cmd.moved.ensure_non_negative("moved")?;
        cmd.returned.ensure_non_negative("returned")?;

        let delta = cmd.returned.try_sub(cmd.moved)?;
        let new_avail = self.avail.try_add(delta)?;
        if new_avail.is_negative() {
            return Err(DomainError::InsufficientStock {
                available: self.avail,
                requested: cmd.moved - cmd.returned,
            });
        }

        Ok(vec![ItemEvent::StockMoved(StockMoved {
            item_id: cmd.item_id,
            movement_id: cmd.movement_id,
            moved: cmd.moved,
            returned: cmd.returned,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_override(&self, cmd: &OverrideTotals) -> Result<Vec<ItemEvent>, DomainError> {
        self.ensure_existing(cmd.item_id)?;
        cmd.amount.ensure_non_negative("amount")?;
        cmd.avail.ensure_non_negative("avail")?;

        Ok(vec![ItemEvent::TotalsOverridden(TotalsOverridden {
            item_id: cmd.item_id,
            amount: cmd.amount,
            avail: cmd.avail,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created_item(name: &str) -> Item {
        let item_id = ItemId::new();
        let mut item = Item::empty(item_id);
        let events = item
            .handle(&ItemCommand::CreateItem(CreateItem {
                item_id,
                name: name.to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            item.apply(e);
        }
        item
    }

    fn execute(item: &mut Item, command: ItemCommand) -> Result<(), DomainError> {
        item.execute(&command).map(|_| ())
    }

    #[test]
    fn purchase_raises_amount_and_availability() {
        let mut item = created_item("Projector");
        let item_id = item.id_typed();
        execute(
            &mut item,
            ItemCommand::RecordPurchase(RecordPurchase {
                item_id,
                purchase_id: PurchaseId::new(),
                quantity: Quantity::units(10),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(item.amount(), Quantity::units(10));
        assert_eq!(item.avail(), Quantity::units(10));
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn movement_only_touches_availability() {
        let mut item = created_item("Projector");
        let item_id = item.id_typed();
        execute(
            &mut item,
            ItemCommand::RecordPurchase(RecordPurchase {
                item_id,
                purchase_id: PurchaseId::new(),
                quantity: Quantity::units(10),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut item,
            ItemCommand::RecordMovement(RecordMovement {
                item_id,
                movement_id: MovementId::new(),
                moved: Quantity::units(4),
                returned: Quantity::units(1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(item.amount(), Quantity::units(10));
        assert_eq!(item.avail(), Quantity::units(7));
    }

    #[test]
    fn cannot_move_more_than_available() {
        let mut item = created_item("Projector");
        let item_id = item.id_typed();
        let err = execute(
            &mut item,
            ItemCommand::RecordMovement(RecordMovement {
                item_id,
                movement_id: MovementId::new(),
                moved: Quantity::units(1),
                returned: Quantity::ZERO,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                available: Quantity::ZERO,
                requested: Quantity::units(1),
            }
        );
        assert_eq!(item.version(), 1);
    }

    #[test]
    fn totals_out_of_range_are_rejected_before_apply() {
        let mut item = created_item("Projector");
        let item_id = item.id_typed();
        execute(
            &mut item,
            ItemCommand::OverrideTotals(OverrideTotals {
                item_id,
                amount: Quantity::MAX,
                avail: Quantity::MAX,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = execute(
            &mut item,
            ItemCommand::RecordPurchase(RecordPurchase {
                item_id,
                purchase_id: PurchaseId::new(),
                quantity: Quantity::units(1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("out of range")));

        let err = execute(
            &mut item,
            ItemCommand::RecordMovement(RecordMovement {
                item_id,
                movement_id: MovementId::new(),
                moved: Quantity::ZERO,
                returned: Quantity::units(1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert_eq!((item.amount(), item.avail()), (Quantity::MAX, Quantity::MAX));
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn commands_on_missing_item_are_not_found() {
        let item = Item::empty(ItemId::new());
        let err = item
            .handle(&ItemCommand::OverrideTotals(OverrideTotals {
                item_id: item.id_typed(),
                amount: Quantity::ZERO,
                avail: Quantity::ZERO,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn create_twice_conflicts() {
        let item = created_item("Projector");
        let err = item
            .handle(&ItemCommand::CreateItem(CreateItem {
                item_id: item.id_typed(),
                name: "Again".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn override_replaces_totals() {
        let mut item = created_item("Projector");
        let item_id = item.id_typed();
        execute(
            &mut item,
            ItemCommand::OverrideTotals(OverrideTotals {
                item_id,
                amount: Quantity::units(3),
                avail: Quantity::units(2),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!((item.amount(), item.avail()), (Quantity::units(3), Quantity::units(2)));
    }

    #[test]
    fn events_carry_stable_type_names() {
        let event = ItemEvent::StockMoved(StockMoved {
            item_id: ItemId::new(),
            movement_id: MovementId::new(),
            moved: Quantity::units(1),
            returned: Quantity::ZERO,
            occurred_at: Utc::now(),
        });
        assert_eq!(event.event_type(), "inventory.item.stock_moved");
        let json = serde_json::to_value(&event).unwrap();
        let back: ItemEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
