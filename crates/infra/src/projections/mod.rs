//! Projections: event streams in, queryable read models out.
//!
//! Every projection follows the same discipline: gate on a per-stream cursor
//! (duplicates are skipped, gaps are errors), check mill isolation at the
//! event level, update the read model, advance the cursor. Read models are
//! disposable and can be rebuilt by replaying history.

use thiserror::Error;

pub mod arrivals;
mod cursors;
pub mod daily_stock;
pub mod driver_roster;
pub mod godown_register;
pub mod mandi_directory;
pub mod users;
pub mod vehicle_registry;

pub use arrivals::{ArrivalRegisterEntry, ArrivalsProjection};
pub use daily_stock::{DailyStockProjection, StockRegister};
pub use driver_roster::{DriverRosterEntry, DriverRosterProjection};
pub use godown_register::{GodownRegisterEntry, GodownRegisterProjection};
pub use mandi_directory::{MandiDirectoryEntry, MandiDirectoryProjection};
pub use users::{EffectivePermissions, UserRecord, UsersProjection};
pub use vehicle_registry::{VehicleRegistryEntry, VehicleRegistryProjection};

pub(crate) use cursors::{CursorGate, StreamCursors};

/// Why a projection refused an envelope.
#[derive(Debug, Error)]
pub enum ProjectionApplyError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("mill isolation violation: {0}")]
    MillIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Deterministic replay order for rebuilds: mill, aggregate, sequence.
pub(crate) fn sort_for_replay(
    envelopes: &mut [millbook_events::EventEnvelope<serde_json::Value>],
) {
    envelopes.sort_by_key(|e| {
        (
            *e.mill_id().as_uuid().as_bytes(),
            *e.aggregate_id().as_uuid().as_bytes(),
            e.sequence_number(),
        )
    });
}
