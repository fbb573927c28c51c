use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: they can be deleted and rebuilt from the
/// event stream at any time, because events are the source of truth. How a
/// read model is stored is an infrastructure concern; this trait only defines
/// event consumption.
///
/// ## Idempotency
///
/// Projections must be idempotent: applying the same event twice must produce
/// the same read model. The bus delivers at-least-once, and rebuilds replay
/// history, so duplicates are a fact of life. Implementations typically track
/// per-stream sequence numbers and skip anything at or below the cursor.
///
/// ## Mill isolation
///
/// The envelope carries `mill_id`; projections must scope every read-model
/// update to it so one mill's events can never leak into another's views.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// Irrelevant events should be ignored; unrecoverable inconsistencies may
    /// be logged and skipped. For structured error handling use
    /// `ProjectionRunner::apply`, which returns `ProjectionError`.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
