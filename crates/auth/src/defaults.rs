//! The warehouse's own capability contexts.

use crate::capability::{CapabilityDef, ContextDef};
use crate::error::CapabilityError;
use crate::registry::CapabilityRegistry;

/// Context slugs.
pub mod contexts {
    pub const ITEMS: &str = "items";
    pub const PURCHASES: &str = "purchases";
    pub const MOVEMENTS: &str = "movements";
    pub const LOCATIONS: &str = "locations";
    pub const HOLDERS: &str = "holders";
    pub const CONSISTENCY: &str = "consistency";
}

/// Capability slugs.
pub mod caps {
    pub const VIEW_ITEMS: &str = "view_items";
    pub const EDIT_ITEMS: &str = "edit_items";
    pub const DELETE_ITEMS: &str = "delete_items";

    pub const VIEW_PURCHASES: &str = "view_purchases";
    pub const EDIT_PURCHASES: &str = "edit_purchases";
    pub const DELETE_PURCHASES: &str = "delete_purchases";

    pub const VIEW_MOVEMENTS: &str = "view_movements";
    pub const EDIT_MOVEMENTS: &str = "edit_movements";
    pub const DELETE_MOVEMENTS: &str = "delete_movements";

    pub const VIEW_LOCATIONS: &str = "view_locations";
    pub const EDIT_LOCATIONS: &str = "edit_locations";
    pub const DELETE_LOCATIONS: &str = "delete_locations";

    pub const VIEW_HOLDERS: &str = "view_holders";
    pub const EDIT_HOLDERS: &str = "edit_holders";
    pub const DELETE_HOLDERS: &str = "delete_holders";

    pub const RUN_CONSISTENCY_CHECK: &str = "run_consistency_check";
}

/// (context, label, description, [view, edit, delete])
const RECORD_CONTEXTS: [(&str, &str, &str, [&str; 3]); 5] = [
    (
        contexts::ITEMS,
        "Items",
        "Inventory items and their stock totals",
        [caps::VIEW_ITEMS, caps::EDIT_ITEMS, caps::DELETE_ITEMS],
    ),
    (
        contexts::PURCHASES,
        "Purchases",
        "Acquisitions of stock into locations",
        [caps::VIEW_PURCHASES, caps::EDIT_PURCHASES, caps::DELETE_PURCHASES],
    ),
    (
        contexts::MOVEMENTS,
        "Movements",
        "Stock lent, returned, donated or lost by holders",
        [caps::VIEW_MOVEMENTS, caps::EDIT_MOVEMENTS, caps::DELETE_MOVEMENTS],
    ),
    (
        contexts::LOCATIONS,
        "Locations",
        "Places where stock is kept",
        [caps::VIEW_LOCATIONS, caps::EDIT_LOCATIONS, caps::DELETE_LOCATIONS],
    ),
    (
        contexts::HOLDERS,
        "Holders",
        "People or organisations holding moved stock",
        [caps::VIEW_HOLDERS, caps::EDIT_HOLDERS, caps::DELETE_HOLDERS],
    ),
];

/// Register the warehouse contexts and capabilities.
///
/// Within each record context `delete_*` depends on `edit_*`, which depends
/// on `view_*`.
pub fn register_defaults(registry: &mut CapabilityRegistry) -> Result<(), CapabilityError> {
    for (context, label, description, [view, edit, delete]) in RECORD_CONTEXTS {
        registry.register_context(context, ContextDef::new(label, description))?;
        registry.register_cap(
            view,
            CapabilityDef::new(context, format!("View {}", label.to_lowercase())),
        )?;
        registry.register_cap(
            edit,
            CapabilityDef::new(context, format!("Edit {}", label.to_lowercase())).depends_on(view),
        )?;
        registry.register_cap(
            delete,
            CapabilityDef::new(context, format!("Delete {}", label.to_lowercase())).depends_on(edit),
        )?;
    }

    registry.register_context(
        contexts::CONSISTENCY,
        ContextDef::new("Consistency", "Stock ledger audits"),
    )?;
    registry.register_cap(
        caps::RUN_CONSISTENCY_CHECK,
        CapabilityDef::new(contexts::CONSISTENCY, "Run consistency check")
            .description("Recompute stock totals from purchases and movements"),
    )?;

    Ok(())
}
