use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use millbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, MillId};
use millbook_events::Event;

/// Vehicle identifier (mill-scoped via `mill_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub AggregateId);

impl VehicleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Normalize a registration plate the way the gate clerk types it:
/// uppercase, inner whitespace dropped ("mh 35 ab 1234" → "MH35AB1234").
pub fn normalize_registration(raw: &str) -> Result<String, DomainError> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.is_empty() {
        return Err(DomainError::validation("vehicle registration must not be empty"));
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(DomainError::validation(
            "vehicle registration may only contain letters, digits and dashes",
        ));
    }
    Ok(normalized)
}

/// Aggregate root: Vehicle.
///
/// PUC (pollution-under-control) expiry is tracked so the register can flag
/// trucks arriving on an expired certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    id: VehicleId,
    mill_id: Option<MillId>,
    registration: String,
    owner_name: Option<String>,
    puc_expiry: Option<NaiveDate>,
    permit_number: Option<String>,
    removed: bool,
    version: u64,
    created: bool,
}

impl Vehicle {
    pub fn empty(id: VehicleId) -> Self {
        Self {
            id,
            mill_id: None,
            registration: String::new(),
            owner_name: None,
            puc_expiry: None,
            permit_number: None,
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VehicleId {
        self.id
    }

    pub fn registration(&self) -> &str {
        &self.registration
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    pub fn puc_expiry(&self) -> Option<NaiveDate> {
        self.puc_expiry
    }

    pub fn permit_number(&self) -> Option<&str> {
        self.permit_number.as_deref()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Whether the PUC certificate covers `date`. No certificate on file
    /// counts as invalid.
    pub fn puc_valid_on(&self, date: NaiveDate) -> bool {
        self.puc_expiry.map(|expiry| date <= expiry).unwrap_or(false)
    }
}

impl AggregateRoot for Vehicle {
    type Id = VehicleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterVehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterVehicle {
    pub mill_id: MillId,
    pub vehicle_id: VehicleId,
    pub registration: String,
    pub owner_name: Option<String>,
    pub puc_expiry: Option<NaiveDate>,
    pub permit_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails (everything but the registration plate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub mill_id: MillId,
    pub vehicle_id: VehicleId,
    pub owner_name: Option<String>,
    pub puc_expiry: Option<NaiveDate>,
    pub permit_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveVehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveVehicle {
    pub mill_id: MillId,
    pub vehicle_id: VehicleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleCommand {
    Register(RegisterVehicle),
    UpdateDetails(UpdateDetails),
    Remove(RemoveVehicle),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRegistered {
    pub mill_id: MillId,
    pub vehicle_id: VehicleId,
    pub registration: String,
    pub owner_name: Option<String>,
    pub puc_expiry: Option<NaiveDate>,
    pub permit_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDetailsUpdated {
    pub mill_id: MillId,
    pub vehicle_id: VehicleId,
    pub owner_name: Option<String>,
    pub puc_expiry: Option<NaiveDate>,
    pub permit_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRemoved {
    pub mill_id: MillId,
    pub vehicle_id: VehicleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleEvent {
    Registered(VehicleRegistered),
    DetailsUpdated(VehicleDetailsUpdated),
    Removed(VehicleRemoved),
}

impl Event for VehicleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VehicleEvent::Registered(_) => "registry.vehicle.registered",
            VehicleEvent::DetailsUpdated(_) => "registry.vehicle.details_updated",
            VehicleEvent::Removed(_) => "registry.vehicle.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VehicleEvent::Registered(e) => e.occurred_at,
            VehicleEvent::DetailsUpdated(e) => e.occurred_at,
            VehicleEvent::Removed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Vehicle {
    type Command = VehicleCommand;
    type Event = VehicleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VehicleEvent::Registered(e) => {
                self.id = e.vehicle_id;
                self.mill_id = Some(e.mill_id);
                self.registration = e.registration.clone();
                self.owner_name = e.owner_name.clone();
                self.puc_expiry = e.puc_expiry;
                self.permit_number = e.permit_number.clone();
                self.removed = false;
                self.created = true;
            }
            VehicleEvent::DetailsUpdated(e) => {
                self.owner_name = e.owner_name.clone();
                self.puc_expiry = e.puc_expiry;
                self.permit_number = e.permit_number.clone();
            }
            VehicleEvent::Removed(_) => {
                self.removed = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VehicleCommand::Register(cmd) => self.handle_register(cmd),
            VehicleCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            VehicleCommand::Remove(cmd) => self.handle_remove(cmd),
        }
    }
}

impl Vehicle {
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
        if self.removed {
            return Err(DomainError::invariant("vehicle has been removed"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterVehicle) -> Result<Vec<VehicleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("vehicle already registered"));
        }

        let registration = normalize_registration(&cmd.registration)?;

        Ok(vec![VehicleEvent::Registered(VehicleRegistered {
            mill_id: cmd.mill_id,
            vehicle_id: cmd.vehicle_id,
            registration,
            owner_name: cmd.owner_name.clone(),
            puc_expiry: cmd.puc_expiry,
            permit_number: cmd.permit_number.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<VehicleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;

        Ok(vec![VehicleEvent::DetailsUpdated(VehicleDetailsUpdated {
            mill_id: cmd.mill_id,
            vehicle_id: cmd.vehicle_id,
            owner_name: cmd.owner_name.clone(),
            puc_expiry: cmd.puc_expiry,
            permit_number: cmd.permit_number.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveVehicle) -> Result<Vec<VehicleEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;

        Ok(vec![VehicleEvent::Removed(VehicleRemoved {
            mill_id: cmd.mill_id,
            vehicle_id: cmd.vehicle_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millbook_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn registration_is_normalized() {
        assert_eq!(normalize_registration(" mh 35 ab 1234 ").unwrap(), "MH35AB1234");
        assert!(normalize_registration("   ").is_err());
        assert!(normalize_registration("MH35@1234").is_err());
    }

    #[test]
    fn puc_validity_is_inclusive_of_expiry_day() {
        let mill_id = MillId::new();
        let vehicle_id = VehicleId::new(AggregateId::new());
        let mut vehicle = Vehicle::empty(vehicle_id);

        execute(
            &mut vehicle,
            &VehicleCommand::Register(RegisterVehicle {
                mill_id,
                vehicle_id,
                registration: "MH35AB1234".to_string(),
                owner_name: Some("Transport Co".to_string()),
                puc_expiry: Some(date(2025, 3, 31)),
                permit_number: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert!(vehicle.puc_valid_on(date(2025, 3, 31)));
        assert!(!vehicle.puc_valid_on(date(2025, 4, 1)));
    }

    #[test]
    fn no_certificate_counts_as_invalid() {
        let vehicle_id = VehicleId::new(AggregateId::new());
        let mut vehicle = Vehicle::empty(vehicle_id);

        execute(
            &mut vehicle,
            &VehicleCommand::Register(RegisterVehicle {
                mill_id: MillId::new(),
                vehicle_id,
                registration: "CG04XY9".to_string(),
                owner_name: None,
                puc_expiry: None,
                permit_number: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert!(!vehicle.puc_valid_on(date(2025, 1, 1)));
    }

    #[test]
    fn update_replaces_details_but_not_registration() {
        let mill_id = MillId::new();
        let vehicle_id = VehicleId::new(AggregateId::new());
        let mut vehicle = Vehicle::empty(vehicle_id);

        execute(
            &mut vehicle,
            &VehicleCommand::Register(RegisterVehicle {
                mill_id,
                vehicle_id,
                registration: "MH35AB1234".to_string(),
                owner_name: None,
                puc_expiry: None,
                permit_number: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        execute(
            &mut vehicle,
            &VehicleCommand::UpdateDetails(UpdateDetails {
                mill_id,
                vehicle_id,
                owner_name: Some("New Owner".to_string()),
                puc_expiry: Some(date(2026, 6, 30)),
                permit_number: Some("PRM-881".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(vehicle.registration(), "MH35AB1234");
        assert_eq!(vehicle.owner_name(), Some("New Owner"));
        assert_eq!(vehicle.permit_number(), Some("PRM-881"));
    }
}
