use std::collections::HashMap;
use std::sync::RwLock;

use piwi_core::{Entity, HolderId, ItemId, LocationId, MovementId, PurchaseId};
use piwi_inventory::{Holder, Item, Location, Movement, Purchase};

use super::InventoryRepository;

#[derive(Debug, Default)]
struct Records {
    items: HashMap<ItemId, Item>,
    purchases: HashMap<PurchaseId, Purchase>,
    movements: HashMap<MovementId, Movement>,
    locations: HashMap<LocationId, Location>,
    holders: HashMap<HolderId, Holder>,
}

/// In-memory inventory storage for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInventoryRepository {
    inner: RwLock<Records>,
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Records) -> T) -> Option<T> {
        self.inner.read().ok().map(|records| f(&records))
    }

    fn write(&self, f: impl FnOnce(&mut Records)) {
        if let Ok(mut records) = self.inner.write() {
            f(&mut records);
        }
    }
}

impl InventoryRepository for InMemoryInventoryRepository {
    fn item(&self, id: ItemId) -> Option<Item> {
        self.read(|r| r.items.get(&id).cloned()).flatten()
    }

    fn items(&self) -> Vec<Item> {
        let mut items = self
            .read(|r| r.items.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        items.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        items
    }

    fn save_item(&self, item: Item) {
        self.write(|r| {
            r.items.insert(item.id_typed(), item);
        });
    }

    fn purchase(&self, id: PurchaseId) -> Option<Purchase> {
        self.read(|r| r.purchases.get(&id).cloned()).flatten()
    }

    fn purchases_for_item(&self, item_id: ItemId) -> Vec<Purchase> {
        let mut purchases = self
            .read(|r| {
                r.purchases
                    .values()
                    .filter(|p| p.item_id == item_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        purchases.sort_by_key(|p| (p.date, p.id));
        purchases
    }

    fn save_purchase(&self, purchase: Purchase) {
        self.write(|r| {
            r.purchases.insert(purchase.key(), purchase);
        });
    }

    fn movement(&self, id: MovementId) -> Option<Movement> {
        self.read(|r| r.movements.get(&id).cloned()).flatten()
    }

    fn movements_for_item(&self, item_id: ItemId) -> Vec<Movement> {
        let mut movements = self
            .read(|r| {
                r.movements
                    .values()
                    .filter(|m| m.item_id == item_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        movements.sort_by_key(|m| (m.date, m.id));
        movements
    }

    fn save_movement(&self, movement: Movement) {
        self.write(|r| {
            r.movements.insert(movement.key(), movement);
        });
    }

    fn location(&self, id: LocationId) -> Option<Location> {
        self.read(|r| r.locations.get(&id).cloned()).flatten()
    }

    fn save_location(&self, location: Location) {
        self.write(|r| {
            r.locations.insert(location.key(), location);
        });
    }

    fn holder(&self, id: HolderId) -> Option<Holder> {
        self.read(|r| r.holders.get(&id).cloned()).flatten()
    }

    fn save_holder(&self, holder: Holder) {
        self.write(|r| {
            r.holders.insert(holder.key(), holder);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};

    use piwi_core::{Aggregate, Quantity};
    use piwi_inventory::{CreateItem, ItemCommand};

    use super::*;

    fn item(name: &str) -> Item {
        let id = ItemId::new();
        let mut item = Item::empty(id);
        let cmd = ItemCommand::CreateItem(CreateItem {
            item_id: id,
            name: name.into(),
            occurred_at: Utc::now(),
        });
        item.execute(&cmd).unwrap();
        item
    }

    #[test]
    fn items_are_listed_by_name() {
        let repo = InMemoryInventoryRepository::new();
        for name in ["Tent", "Axe", "Lantern"] {
            repo.save_item(item(name));
        }
        let names: Vec<String> = repo.items().iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, ["Axe", "Lantern", "Tent"]);
    }

    #[test]
    fn purchases_are_scoped_to_item_and_dated() {
        let repo = InMemoryInventoryRepository::new();
        let (tent, axe) = (ItemId::new(), ItemId::new());
        let loc = LocationId::new();
        let now = Utc::now();
        let bought = |item_id, date| {
            Purchase::new(PurchaseId::new(), item_id, date, BTreeMap::from([(loc, Quantity::units(1))])).unwrap()
        };

        let later = bought(tent, now);
        let earlier = bought(tent, now - Duration::days(1));
        repo.save_purchase(later.clone());
        repo.save_purchase(earlier.clone());
        repo.save_purchase(bought(axe, now));

        assert_eq!(repo.purchases_for_item(tent), vec![earlier, later]);
        assert!(repo.purchase(PurchaseId::new()).is_none());
    }
}
