//! Records tracked by identity.

/// A record that stays the same record while its attributes change: two
/// locations both named "Shed" are still two locations.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;

    /// Owned copy of the id, for use as a map key.
    fn key(&self) -> Self::Id {
        *self.id()
    }
}
