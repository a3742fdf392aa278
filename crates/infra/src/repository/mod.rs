//! Inventory record storage abstractions.

pub mod in_memory;

pub use in_memory::InMemoryInventoryRepository;

use std::sync::Arc;

use piwi_core::{HolderId, ItemId, LocationId, MovementId, PurchaseId};
use piwi_inventory::{Holder, Item, Location, Movement, Purchase};

/// Storage of items, purchases, movements and location/holder terms.
///
/// Lookups double as reference validation: a `None` means the id does not
/// name a record of that kind.
pub trait InventoryRepository: Send + Sync {
    fn item(&self, id: ItemId) -> Option<Item>;
    /// All items, ordered by name.
    fn items(&self) -> Vec<Item>;
    fn save_item(&self, item: Item);

    fn purchase(&self, id: PurchaseId) -> Option<Purchase>;
    fn purchases_for_item(&self, item_id: ItemId) -> Vec<Purchase>;
    fn save_purchase(&self, purchase: Purchase);

    fn movement(&self, id: MovementId) -> Option<Movement>;
    fn movements_for_item(&self, item_id: ItemId) -> Vec<Movement>;
    fn save_movement(&self, movement: Movement);

    fn location(&self, id: LocationId) -> Option<Location>;
    fn save_location(&self, location: Location);

    fn holder(&self, id: HolderId) -> Option<Holder>;
    fn save_holder(&self, holder: Holder);
}

impl<S> InventoryRepository for Arc<S>
where
    S: InventoryRepository + ?Sized,
{
    fn item(&self, id: ItemId) -> Option<Item> {
        (**self).item(id)
    }

    fn items(&self) -> Vec<Item> {
        (**self).items()
    }

    fn save_item(&self, item: Item) {
        (**self).save_item(item)
    }

    fn purchase(&self, id: PurchaseId) -> Option<Purchase> {
        (**self).purchase(id)
    }

    fn purchases_for_item(&self, item_id: ItemId) -> Vec<Purchase> {
        (**self).purchases_for_item(item_id)
    }

    fn save_purchase(&self, purchase: Purchase) {
        (**self).save_purchase(purchase)
    }

    fn movement(&self, id: MovementId) -> Option<Movement> {
        (**self).movement(id)
    }

    fn movements_for_item(&self, item_id: ItemId) -> Vec<Movement> {
        (**self).movements_for_item(item_id)
    }

    fn save_movement(&self, movement: Movement) {
        (**self).save_movement(movement)
    }

    fn location(&self, id: LocationId) -> Option<Location> {
        (**self).location(id)
    }

    fn save_location(&self, location: Location) {
        (**self).save_location(location)
    }

    fn holder(&self, id: HolderId) -> Option<Holder> {
        (**self).holder(id)
    }

    fn save_holder(&self, holder: Holder) {
        (**self).save_holder(holder)
    }
}
