//! `millbook-stock` — the daily paddy stock book.
//!
//! The `StockBook` aggregate records the facts (a seeded opening balance,
//! per-date issues to milling); the `ledger` module turns those facts plus
//! per-date receipts into the running register. The register is never
//! maintained incrementally: every change re-runs the full fold.

pub mod book;
pub mod ledger;

pub use book::*;
pub use ledger::{DayEntry, RegisterSummary, recalculate, summarize};
