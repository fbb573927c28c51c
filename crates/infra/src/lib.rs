//! `millbook-infra` — storage, dispatch and read-model infrastructure.
//!
//! Nothing in this crate contains business rules; it loads, persists,
//! publishes and projects what the domain crates decide.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use read_model::{InMemoryMillStore, MillStore};
