//! `millbook-registry` — reference data every arrival entry leans on.
//!
//! Mandis, drivers, vehicles and godowns are small event-sourced aggregates
//! with a register / update / remove lifecycle. Uniqueness of business keys
//! (mandi name, vehicle registration, ...) is enforced per mill at the
//! read-model boundary, not here.

pub mod driver;
pub mod godown;
pub mod mandi;
pub mod vehicle;

pub use driver::*;
pub use godown::*;
pub use mandi::*;
pub use vehicle::*;
