//! `millbook-procurement` — truck arrivals from mandis.

pub mod arrival;

pub use arrival::*;
