use serde_json::Value as JsonValue;

use millbook_core::{MillId, Quantity};
use millbook_events::EventEnvelope;
use millbook_registry::{GodownEvent, GodownId};

use super::{CursorGate, ProjectionApplyError, StreamCursors};
use crate::read_model::MillStore;

pub const AGGREGATE_TYPE: &str = "registry.godown";

/// Queryable godown register entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GodownRegisterEntry {
    pub godown_id: GodownId,
    pub name: String,
    pub capacity: Quantity,
}

#[derive(Debug)]
pub struct GodownRegisterProjection<S>
where
    S: MillStore<GodownId, GodownRegisterEntry>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> GodownRegisterProjection<S>
where
    S: MillStore<GodownId, GodownRegisterEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, mill_id: MillId, godown_id: &GodownId) -> Option<GodownRegisterEntry> {
        self.store.get(mill_id, godown_id)
    }

    pub fn list(&self, mill_id: MillId) -> Vec<GodownRegisterEntry> {
        let mut entries = self.store.list(mill_id);
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn find_by_name(&self, mill_id: MillId, name: &str) -> Option<GodownRegisterEntry> {
        let needle = name.trim().to_lowercase();
        self.store
            .list(mill_id)
            .into_iter()
            .find(|e| e.name.to_lowercase() == needle)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let mill_id = envelope.mill_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.gate(mill_id, aggregate_id, seq)? {
            CursorGate::Skip => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: GodownEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, godown_id) = match &ev {
            GodownEvent::Registered(e) => (e.mill_id, e.godown_id),
            GodownEvent::CapacityChanged(e) => (e.mill_id, e.godown_id),
            GodownEvent::Removed(e) => (e.mill_id, e.godown_id),
        };

        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }
        if godown_id.0 != aggregate_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event godown_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            GodownEvent::Registered(e) => {
                self.store.upsert(
                    mill_id,
                    e.godown_id,
                    GodownRegisterEntry {
                        godown_id: e.godown_id,
                        name: e.name,
                        capacity: e.capacity,
                    },
                );
            }
            GodownEvent::CapacityChanged(e) => {
                if let Some(mut entry) = self.store.get(mill_id, &e.godown_id) {
                    entry.capacity = e.capacity;
                    self.store.upsert(mill_id, e.godown_id, entry);
                }
            }
            GodownEvent::Removed(e) => {
                self.store.remove(mill_id, &e.godown_id);
            }
        }

        self.cursors.advance(mill_id, aggregate_id, seq);
        Ok(())
    }
}
