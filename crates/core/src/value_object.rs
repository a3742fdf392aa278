//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values:
/// two `Quantity` values of `4.5` are the same quantity, whereas two items
/// with the same name are still different items.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
