use serde_json::Value as JsonValue;

use millbook_core::MillId;
use millbook_events::EventEnvelope;
use millbook_registry::{DriverEvent, DriverId};

use super::{CursorGate, ProjectionApplyError, StreamCursors};
use crate::read_model::MillStore;

pub const AGGREGATE_TYPE: &str = "registry.driver";

/// Queryable driver roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRosterEntry {
    pub driver_id: DriverId,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug)]
pub struct DriverRosterProjection<S>
where
    S: MillStore<DriverId, DriverRosterEntry>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> DriverRosterProjection<S>
where
    S: MillStore<DriverId, DriverRosterEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, mill_id: MillId, driver_id: &DriverId) -> Option<DriverRosterEntry> {
        self.store.get(mill_id, driver_id)
    }

    pub fn list(&self, mill_id: MillId) -> Vec<DriverRosterEntry> {
        let mut entries = self.store.list(mill_id);
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn find_by_name(&self, mill_id: MillId, name: &str) -> Option<DriverRosterEntry> {
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

        let ev: DriverEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, driver_id) = match &ev {
            DriverEvent::Registered(e) => (e.mill_id, e.driver_id),
            DriverEvent::PhoneChanged(e) => (e.mill_id, e.driver_id),
            DriverEvent::Removed(e) => (e.mill_id, e.driver_id),
        };

        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }
        if driver_id.0 != aggregate_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event driver_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            DriverEvent::Registered(e) => {
                self.store.upsert(
                    mill_id,
                    e.driver_id,
                    DriverRosterEntry {
                        driver_id: e.driver_id,
                        name: e.name,
                        phone: e.phone,
                    },
                );
            }
            DriverEvent::PhoneChanged(e) => {
                if let Some(mut entry) = self.store.get(mill_id, &e.driver_id) {
                    entry.phone = e.phone;
                    self.store.upsert(mill_id, e.driver_id, entry);
                }
            }
            DriverEvent::Removed(e) => {
                self.store.remove(mill_id, &e.driver_id);
            }
        }

        self.cursors.advance(mill_id, aggregate_id, seq);
        Ok(())
    }
}
