use crate::{Command, Event};

/// Handles a command and emits events (command handler abstraction).
///
/// A standalone interface for command → events transformation, independent of
/// the aggregate lifecycle. Errors are domain-specific, hence the associated
/// error type.
pub trait CommandHandler {
    type Cmd: Command;
    type Ev: Event;
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn handle(&self, command: Self::Cmd) -> Result<Vec<Self::Ev>, Self::Error>;
}

/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decide via `handle`, then evolve the aggregate in place via `apply` for
/// each emitted event. For the full pipeline (persistence + publication) use
/// the infrastructure dispatcher instead; this is the inline/test path.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: millbook_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
