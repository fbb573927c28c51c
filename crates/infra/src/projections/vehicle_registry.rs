use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use millbook_core::MillId;
use millbook_events::EventEnvelope;
use millbook_registry::{VehicleEvent, VehicleId};

use super::{CursorGate, ProjectionApplyError, StreamCursors};
use crate::read_model::MillStore;

pub const AGGREGATE_TYPE: &str = "registry.vehicle";

/// Queryable vehicle registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRegistryEntry {
    pub vehicle_id: VehicleId,
    pub registration: String,
    pub owner_name: Option<String>,
    pub puc_expiry: Option<NaiveDate>,
    pub permit_number: Option<String>,
}

impl VehicleRegistryEntry {
    /// Whether the PUC certificate covers `date` (none on file = invalid).
    pub fn puc_valid_on(&self, date: NaiveDate) -> bool {
        self.puc_expiry.map(|expiry| date <= expiry).unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct VehicleRegistryProjection<S>
where
    S: MillStore<VehicleId, VehicleRegistryEntry>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> VehicleRegistryProjection<S>
where
    S: MillStore<VehicleId, VehicleRegistryEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, mill_id: MillId, vehicle_id: &VehicleId) -> Option<VehicleRegistryEntry> {
        self.store.get(mill_id, vehicle_id)
    }

    pub fn list(&self, mill_id: MillId) -> Vec<VehicleRegistryEntry> {
        let mut entries = self.store.list(mill_id);
        entries.sort_by(|a, b| a.registration.cmp(&b.registration));
        entries
    }

    /// Registration plates are stored normalized, so equality is exact.
    pub fn find_by_registration(
        &self,
        mill_id: MillId,
        registration: &str,
    ) -> Option<VehicleRegistryEntry> {
        self.store
            .list(mill_id)
            .into_iter()
            .find(|e| e.registration == registration)
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

        let ev: VehicleEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, vehicle_id) = match &ev {
            VehicleEvent::Registered(e) => (e.mill_id, e.vehicle_id),
            VehicleEvent::DetailsUpdated(e) => (e.mill_id, e.vehicle_id),
            VehicleEvent::Removed(e) => (e.mill_id, e.vehicle_id),
        };

        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }
        if vehicle_id.0 != aggregate_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event vehicle_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            VehicleEvent::Registered(e) => {
                self.store.upsert(
                    mill_id,
                    e.vehicle_id,
                    VehicleRegistryEntry {
                        vehicle_id: e.vehicle_id,
                        registration: e.registration,
                        owner_name: e.owner_name,
                        puc_expiry: e.puc_expiry,
                        permit_number: e.permit_number,
                    },
                );
            }
            VehicleEvent::DetailsUpdated(e) => {
                if let Some(mut entry) = self.store.get(mill_id, &e.vehicle_id) {
                    entry.owner_name = e.owner_name;
                    entry.puc_expiry = e.puc_expiry;
                    entry.permit_number = e.permit_number;
                    self.store.upsert(mill_id, e.vehicle_id, entry);
                }
            }
            VehicleEvent::Removed(e) => {
                self.store.remove(mill_id, &e.vehicle_id);
            }
        }

        self.cursors.advance(mill_id, aggregate_id, seq);
        Ok(())
    }
}
