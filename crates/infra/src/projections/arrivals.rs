use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use millbook_core::{Distance, KmsYear, MillId, Quantity};
use millbook_events::EventEnvelope;
use millbook_procurement::{ArrivalDetails, ArrivalEvent, ArrivalId};
use millbook_registry::{DriverId, MandiId, VehicleId};

use super::{CursorGate, ProjectionApplyError, StreamCursors, sort_for_replay};
use crate::read_model::MillStore;

pub const AGGREGATE_TYPE: &str = "procurement.arrival";

/// One row of the arrivals register, denormalized for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalRegisterEntry {
    pub arrival_id: ArrivalId,
    pub date: NaiveDate,
    pub season: KmsYear,
    pub ac_note: Option<String>,
    pub mandi_id: MandiId,
    pub mandi_name: String,
    pub distance: Distance,
    pub vehicle_id: VehicleId,
    pub vehicle_registration: String,
    pub driver_id: DriverId,
    pub driver_name: String,
    pub bag_count: u32,
    pub weight: Quantity,
    pub expected_weight: Quantity,
    pub variance: Quantity,
    pub within_tolerance: bool,
}

impl ArrivalRegisterEntry {
    fn from_details(
        arrival_id: ArrivalId,
        date: NaiveDate,
        season: KmsYear,
        details: ArrivalDetails,
    ) -> Self {
        let expected_weight = details.expected_weight();
        let variance = details.variance();
        let within_tolerance = details.within_tolerance();
        Self {
            arrival_id,
            date,
            season,
            ac_note: details.ac_note,
            mandi_id: details.mandi.mandi_id,
            mandi_name: details.mandi.name,
            distance: details.mandi.distance,
            vehicle_id: details.vehicle.vehicle_id,
            vehicle_registration: details.vehicle.registration,
            driver_id: details.driver.driver_id,
            driver_name: details.driver.name,
            bag_count: details.bag_count,
            weight: details.weight,
            expected_weight,
            variance,
            within_tolerance,
        }
    }
}

/// Arrivals register projection. Deleted arrivals drop out of the register;
/// the event stream keeps them for audit.
#[derive(Debug)]
pub struct ArrivalsProjection<S>
where
    S: MillStore<ArrivalId, ArrivalRegisterEntry>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ArrivalsProjection<S>
where
    S: MillStore<ArrivalId, ArrivalRegisterEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, mill_id: MillId, arrival_id: &ArrivalId) -> Option<ArrivalRegisterEntry> {
        self.store.get(mill_id, arrival_id)
    }

    /// Register for one season, newest first (date, then entry id — UUIDv7
    /// ids are time-ordered, which matches insertion order within a day).
    pub fn list_for_season(&self, mill_id: MillId, season: KmsYear) -> Vec<ArrivalRegisterEntry> {
        let mut entries: Vec<_> = self
            .store
            .list(mill_id)
            .into_iter()
            .filter(|e| e.season == season)
            .collect();
        entries.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.arrival_id.0.as_uuid().cmp(a.arrival_id.0.as_uuid()))
        });
        entries
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

        let ev: ArrivalEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, arrival_id) = match &ev {
            ArrivalEvent::Recorded(e) => (e.mill_id, e.arrival_id),
            ArrivalEvent::Amended(e) => (e.mill_id, e.arrival_id),
            ArrivalEvent::Deleted(e) => (e.mill_id, e.arrival_id),
        };

        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }
        if arrival_id.0 != aggregate_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event arrival_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ArrivalEvent::Recorded(e) => {
                self.store.upsert(
                    mill_id,
                    e.arrival_id,
                    ArrivalRegisterEntry::from_details(e.arrival_id, e.date, e.season, e.details),
                );
            }
            ArrivalEvent::Amended(e) => {
                self.store.upsert(
                    mill_id,
                    e.arrival_id,
                    ArrivalRegisterEntry::from_details(e.arrival_id, e.date, e.season, e.details),
                );
            }
            ArrivalEvent::Deleted(e) => {
                self.store.remove(mill_id, &e.arrival_id);
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
