use chrono::{DateTime, Utc};

/// A fact recorded against an aggregate.
///
/// Stock changes are kept as facts rather than overwritten in place, which
/// is what lets stored totals be replayed and audited later.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `inventory.item.stock_moved`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// `event_type@version`, as used in log lines.
    fn qualified_type(&self) -> String {
        format!("{}@{}", self.event_type(), self.version())
    }
}
