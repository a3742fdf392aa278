//! Event-sourced aggregates.

/// Identity and revision of an aggregate.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Count of events applied so far.
    fn version(&self) -> u64;
}

/// An aggregate decides on commands and evolves from events.
///
/// `handle` is pure: it inspects state and returns the events a command
/// produces, or an error, without touching `self`. Only `apply` mutates.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// `handle` then `apply` each resulting event. On error the aggregate is
    /// left unchanged.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}
