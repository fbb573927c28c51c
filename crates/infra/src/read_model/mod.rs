//! Mill-scoped read-model storage.

mod mill_store;

pub use mill_store::{InMemoryMillStore, MillStore};
