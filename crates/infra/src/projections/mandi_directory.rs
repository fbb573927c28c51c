use serde_json::Value as JsonValue;

use millbook_core::{Distance, MillId};
use millbook_events::EventEnvelope;
use millbook_registry::{MandiEvent, MandiId};

use super::{CursorGate, ProjectionApplyError, StreamCursors, sort_for_replay};
use crate::read_model::MillStore;

pub const AGGREGATE_TYPE: &str = "registry.mandi";

/// Queryable mandi directory: the arrival form's mandi picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MandiDirectoryEntry {
    pub mandi_id: MandiId,
    pub name: String,
    pub distance: Distance,
}

/// Mandi directory projection. Removed mandis drop out of the directory;
/// arrivals keep their own snapshots so history is unaffected.
#[derive(Debug)]
pub struct MandiDirectoryProjection<S>
where
    S: MillStore<MandiId, MandiDirectoryEntry>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> MandiDirectoryProjection<S>
where
    S: MillStore<MandiId, MandiDirectoryEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, mill_id: MillId, mandi_id: &MandiId) -> Option<MandiDirectoryEntry> {
        self.store.get(mill_id, mandi_id)
    }

    /// Directory sorted by name (the dashboard's picker order).
    pub fn list(&self, mill_id: MillId) -> Vec<MandiDirectoryEntry> {
        let mut entries = self.store.list(mill_id);
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Case-insensitive name lookup (per-mill uniqueness checks).
    pub fn find_by_name(&self, mill_id: MillId, name: &str) -> Option<MandiDirectoryEntry> {
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

        let ev: MandiEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, mandi_id) = match &ev {
            MandiEvent::Registered(e) => (e.mill_id, e.mandi_id),
            MandiEvent::DistanceChanged(e) => (e.mill_id, e.mandi_id),
            MandiEvent::Removed(e) => (e.mill_id, e.mandi_id),
        };

        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }
        if mandi_id.0 != aggregate_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mandi_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            MandiEvent::Registered(e) => {
                self.store.upsert(
                    mill_id,
                    e.mandi_id,
                    MandiDirectoryEntry {
                        mandi_id: e.mandi_id,
                        name: e.name,
                        distance: e.distance,
                    },
                );
            }
            MandiEvent::DistanceChanged(e) => {
                if let Some(mut entry) = self.store.get(mill_id, &e.mandi_id) {
                    entry.distance = e.distance;
                    self.store.upsert(mill_id, e.mandi_id, entry);
                }
            }
            MandiEvent::Removed(e) => {
                self.store.remove(mill_id, &e.mandi_id);
            }
        }

        self.cursors.advance(mill_id, aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionApplyError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut mills: Vec<_> = envs.iter().map(|e| e.mill_id()).collect();
        mills.sort_by_key(|m| *m.as_uuid().as_bytes());
        mills.dedup();
        for mill in mills {
            self.store.clear_mill(mill);
            self.cursors.clear_mill(mill);
        }

        sort_for_replay(&mut envs);
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
