use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use millbook_core::{
    Aggregate, AggregateId, AggregateRoot, Distance, DomainError, KmsYear, MillId, Quantity,
};
use millbook_events::Event;
use millbook_registry::{DriverId, MandiId, VehicleId};

/// Nominal net weight of one paddy bag.
pub const STANDARD_BAG_KG: i64 = 40;

/// Tolerance band around the expected weight, in percent.
///
/// Loads outside the band are flagged, never rejected: the paddy is already
/// on the weighbridge.
pub const WEIGHT_TOLERANCE_PERCENT: i64 = 10;

/// Expected net weight for a bag count (`bag_count × 40 kg`).
pub fn expected_weight(bag_count: u32) -> Quantity {
    Quantity::from_kg(bag_count as i64 * STANDARD_BAG_KG)
}

/// Arrival identifier (mill-scoped via `mill_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrivalId(pub AggregateId);

impl ArrivalId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ArrivalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Mandi snapshot taken when the arrival is recorded.
///
/// The register stores names and the distance as they were on the day of the
/// arrival; later registry edits never rewrite past entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandiSnapshot {
    pub mandi_id: MandiId,
    pub name: String,
    pub distance: Distance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub vehicle_id: VehicleId,
    pub registration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub driver_id: DriverId,
    pub name: String,
}

/// The mutable body of an arrival entry (everything but the date/season).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalDetails {
    /// Acceptance-note number from the mandi, if issued.
    pub ac_note: Option<String>,
    pub mandi: MandiSnapshot,
    pub vehicle: VehicleSnapshot,
    pub driver: DriverSnapshot,
    pub bag_count: u32,
    /// Net weight off the weighbridge.
    pub weight: Quantity,
}

impl ArrivalDetails {
    pub fn expected_weight(&self) -> Quantity {
        expected_weight(self.bag_count)
    }

    /// Signed deviation from the expected weight.
    pub fn variance(&self) -> Quantity {
        self.weight - self.expected_weight()
    }

    /// Whether the weighed load sits inside the tolerance band.
    pub fn within_tolerance(&self) -> bool {
        let expected = self.expected_weight().kg();
        let deviation = self.variance().kg().abs();
        deviation * 100 <= expected * WEIGHT_TOLERANCE_PERCENT
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.bag_count == 0 {
            return Err(DomainError::validation("bag count must be greater than 0"));
        }
        if !self.weight.is_positive() {
            return Err(DomainError::validation("weight must be greater than 0"));
        }
        if self.mandi.name.trim().is_empty() {
            return Err(DomainError::validation("mandi name must not be empty"));
        }
        if self.vehicle.registration.trim().is_empty() {
            return Err(DomainError::validation("vehicle registration must not be empty"));
        }
        if self.driver.name.trim().is_empty() {
            return Err(DomainError::validation("driver name must not be empty"));
        }
        Ok(())
    }
}

/// Aggregate root: Arrival (one truck at the gate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    id: ArrivalId,
    mill_id: Option<MillId>,
    date: Option<NaiveDate>,
    season: Option<KmsYear>,
    details: Option<ArrivalDetails>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Arrival {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ArrivalId) -> Self {
        Self {
            id,
            mill_id: None,
            date: None,
            season: None,
            details: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ArrivalId {
        self.id
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn season(&self) -> Option<KmsYear> {
        self.season
    }

    pub fn details(&self) -> Option<&ArrivalDetails> {
        self.details.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Arrival {
    type Id = ArrivalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordArrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordArrival {
    pub mill_id: MillId,
    pub arrival_id: ArrivalId,
    pub date: NaiveDate,
    pub season: KmsYear,
    pub details: ArrivalDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AmendArrival (every field except the date/season).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendArrival {
    pub mill_id: MillId,
    pub arrival_id: ArrivalId,
    pub details: ArrivalDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteArrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteArrival {
    pub mill_id: MillId,
    pub arrival_id: ArrivalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrivalCommand {
    Record(RecordArrival),
    Amend(AmendArrival),
    Delete(DeleteArrival),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRecorded {
    pub mill_id: MillId,
    pub arrival_id: ArrivalId,
    pub date: NaiveDate,
    pub season: KmsYear,
    pub details: ArrivalDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Amendments re-state the date/season from the aggregate so downstream
/// consumers never need a lookup to place the change in the register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalAmended {
    pub mill_id: MillId,
    pub arrival_id: ArrivalId,
    pub date: NaiveDate,
    pub season: KmsYear,
    pub details: ArrivalDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalDeleted {
    pub mill_id: MillId,
    pub arrival_id: ArrivalId,
    pub date: NaiveDate,
    pub season: KmsYear,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrivalEvent {
    Recorded(ArrivalRecorded),
    Amended(ArrivalAmended),
    Deleted(ArrivalDeleted),
}

impl Event for ArrivalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ArrivalEvent::Recorded(_) => "procurement.arrival.recorded",
            ArrivalEvent::Amended(_) => "procurement.arrival.amended",
            ArrivalEvent::Deleted(_) => "procurement.arrival.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ArrivalEvent::Recorded(e) => e.occurred_at,
            ArrivalEvent::Amended(e) => e.occurred_at,
            ArrivalEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Arrival {
    type Command = ArrivalCommand;
    type Event = ArrivalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ArrivalEvent::Recorded(e) => {
                self.id = e.arrival_id;
                self.mill_id = Some(e.mill_id);
                self.date = Some(e.date);
                self.season = Some(e.season);
                self.details = Some(e.details.clone());
                self.deleted = false;
                self.created = true;
            }
            ArrivalEvent::Amended(e) => {
                self.details = Some(e.details.clone());
            }
            ArrivalEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ArrivalCommand::Record(cmd) => self.handle_record(cmd),
            ArrivalCommand::Amend(cmd) => self.handle_amend(cmd),
            ArrivalCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Arrival {
    fn ensure_mill(&self, mill_id: MillId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.mill_id != Some(mill_id) {
            return Err(DomainError::invariant("mill mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Err(DomainError::invariant("arrival has been deleted"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordArrival) -> Result<Vec<ArrivalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("arrival already recorded"));
        }
        cmd.details.validate()?;

        Ok(vec![ArrivalEvent::Recorded(ArrivalRecorded {
            mill_id: cmd.mill_id,
            arrival_id: cmd.arrival_id,
            date: cmd.date,
            season: cmd.season,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn placement(&self) -> Result<(NaiveDate, KmsYear), DomainError> {
        match (self.date, self.season) {
            (Some(date), Some(season)) => Ok((date, season)),
            _ => Err(DomainError::invariant("arrival has no recorded date")),
        }
    }

    fn handle_amend(&self, cmd: &AmendArrival) -> Result<Vec<ArrivalEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;
        cmd.details.validate()?;
        let (date, season) = self.placement()?;

        Ok(vec![ArrivalEvent::Amended(ArrivalAmended {
            mill_id: cmd.mill_id,
            arrival_id: cmd.arrival_id,
            date,
            season,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteArrival) -> Result<Vec<ArrivalEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;
        let (date, season) = self.placement()?;

        Ok(vec![ArrivalEvent::Deleted(ArrivalDeleted {
            mill_id: cmd.mill_id,
            arrival_id: cmd.arrival_id,
            date,
            season,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millbook_events::execute;
    use proptest::prelude::*;

    fn test_arrival_id() -> ArrivalId {
        ArrivalId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 14).unwrap()
    }

    fn details(bag_count: u32, weight_kg: i64) -> ArrivalDetails {
        ArrivalDetails {
            ac_note: Some("AC-1021".to_string()),
            mandi: MandiSnapshot {
                mandi_id: MandiId::new(AggregateId::new()),
                name: "Gondia Mandi".to_string(),
                distance: Distance::from_km(42.5).unwrap(),
            },
            vehicle: VehicleSnapshot {
                vehicle_id: VehicleId::new(AggregateId::new()),
                registration: "MH35AB1234".to_string(),
            },
            driver: DriverSnapshot {
                driver_id: DriverId::new(AggregateId::new()),
                name: "Ramesh Kumar".to_string(),
            },
            bag_count,
            weight: Quantity::from_kg(weight_kg),
        }
    }

    fn record_cmd(arrival_id: ArrivalId, mill_id: MillId, details: ArrivalDetails) -> RecordArrival {
        RecordArrival {
            mill_id,
            arrival_id,
            date: test_date(),
            season: KmsYear::starting(2024),
            details,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn record_emits_recorded_event() {
        let arrival_id = test_arrival_id();
        let arrival = Arrival::empty(arrival_id);

        let events = arrival
            .handle(&ArrivalCommand::Record(record_cmd(
                arrival_id,
                MillId::new(),
                details(250, 10_000),
            )))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ArrivalEvent::Recorded(e) => {
                assert_eq!(e.season.label(), "2024-25");
                assert_eq!(e.details.expected_weight().kg(), 10_000);
                assert_eq!(e.details.variance().kg(), 0);
            }
            other => panic!("expected Recorded, got {other:?}"),
        }
    }

    #[test]
    fn zero_bags_and_zero_weight_are_rejected() {
        let arrival_id = test_arrival_id();
        let arrival = Arrival::empty(arrival_id);
        let mill_id = MillId::new();

        let err = arrival
            .handle(&ArrivalCommand::Record(record_cmd(arrival_id, mill_id, details(0, 100))))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = arrival
            .handle(&ArrivalCommand::Record(record_cmd(arrival_id, mill_id, details(10, 0))))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn overweight_load_is_flagged_but_accepted() {
        // 100 bags should weigh 4 000 kg; 5 000 kg is 25% over.
        let d = details(100, 5_000);
        assert!(!d.within_tolerance());
        assert_eq!(d.variance().kg(), 1_000);

        let arrival_id = test_arrival_id();
        let arrival = Arrival::empty(arrival_id);
        assert!(
            arrival
                .handle(&ArrivalCommand::Record(record_cmd(arrival_id, MillId::new(), d)))
                .is_ok()
        );
    }

    #[test]
    fn amend_replaces_details_but_not_date() {
        let arrival_id = test_arrival_id();
        let mill_id = MillId::new();
        let mut arrival = Arrival::empty(arrival_id);

        execute(
            &mut arrival,
            &ArrivalCommand::Record(record_cmd(arrival_id, mill_id, details(250, 10_000))),
        )
        .unwrap();

        execute(
            &mut arrival,
            &ArrivalCommand::Amend(AmendArrival {
                mill_id,
                arrival_id,
                details: details(260, 10_400),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(arrival.date(), Some(test_date()));
        assert_eq!(arrival.details().unwrap().bag_count, 260);
    }

    #[test]
    fn deleted_arrival_rejects_amendment() {
        let arrival_id = test_arrival_id();
        let mill_id = MillId::new();
        let mut arrival = Arrival::empty(arrival_id);

        execute(
            &mut arrival,
            &ArrivalCommand::Record(record_cmd(arrival_id, mill_id, details(250, 10_000))),
        )
        .unwrap();
        execute(
            &mut arrival,
            &ArrivalCommand::Delete(DeleteArrival {
                mill_id,
                arrival_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = arrival
            .handle(&ArrivalCommand::Amend(AmendArrival {
                mill_id,
                arrival_id,
                details: details(251, 10_040),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        /// Property: the tolerance band is exactly ±10% of `bag_count × 40 kg`.
        #[test]
        fn tolerance_band_matches_formula(
            bag_count in 1u32..5_000,
            deviation_permille in -300i64..300,
        ) {
            let expected = expected_weight(bag_count).kg();
            let weight = expected + expected * deviation_permille / 1_000;
            prop_assume!(weight > 0);

            let d = details(bag_count, weight);
            let inside = (weight - expected).abs() * 100 <= expected * WEIGHT_TOLERANCE_PERCENT;
            prop_assert_eq!(d.within_tolerance(), inside);
        }
    }
}
