use millbook_core::AggregateId;

/// A command targets a specific aggregate (command abstraction).
///
/// Commands represent intent and are transient; only the events they produce
/// are persisted. Mill scoping is enforced at the envelope level during
/// persistence, not here, which keeps commands focused on business intent.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
