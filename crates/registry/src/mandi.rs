use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millbook_core::{Aggregate, AggregateId, AggregateRoot, Distance, DomainError, MillId};
use millbook_events::Event;

/// Mandi identifier (mill-scoped via `mill_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MandiId(pub AggregateId);

impl MandiId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MandiId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Mandi (a regulated agricultural produce market).
///
/// The distance to the mill is recorded here once and snapshotted onto each
/// arrival, so later corrections never rewrite past entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mandi {
    id: MandiId,
    mill_id: Option<MillId>,
    name: String,
    distance: Distance,
    removed: bool,
    version: u64,
    created: bool,
}

impl Mandi {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MandiId) -> Self {
        Self {
            id,
            mill_id: None,
            name: String::new(),
            distance: Distance::default(),
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MandiId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

impl AggregateRoot for Mandi {
    type Id = MandiId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterMandi.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMandi {
    pub mill_id: MillId,
    pub mandi_id: MandiId,
    pub name: String,
    pub distance: Distance,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeDistance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDistance {
    pub mill_id: MillId,
    pub mandi_id: MandiId,
    pub distance: Distance,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveMandi.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMandi {
    pub mill_id: MillId,
    pub mandi_id: MandiId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MandiCommand {
    Register(RegisterMandi),
    ChangeDistance(ChangeDistance),
    Remove(RemoveMandi),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandiRegistered {
    pub mill_id: MillId,
    pub mandi_id: MandiId,
    pub name: String,
    pub distance: Distance,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandiDistanceChanged {
    pub mill_id: MillId,
    pub mandi_id: MandiId,
    pub distance: Distance,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandiRemoved {
    pub mill_id: MillId,
    pub mandi_id: MandiId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MandiEvent {
    Registered(MandiRegistered),
    DistanceChanged(MandiDistanceChanged),
    Removed(MandiRemoved),
}

impl Event for MandiEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MandiEvent::Registered(_) => "registry.mandi.registered",
            MandiEvent::DistanceChanged(_) => "registry.mandi.distance_changed",
            MandiEvent::Removed(_) => "registry.mandi.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MandiEvent::Registered(e) => e.occurred_at,
            MandiEvent::DistanceChanged(e) => e.occurred_at,
            MandiEvent::Removed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Mandi {
    type Command = MandiCommand;
    type Event = MandiEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MandiEvent::Registered(e) => {
                self.id = e.mandi_id;
                self.mill_id = Some(e.mill_id);
                self.name = e.name.clone();
                self.distance = e.distance;
                self.removed = false;
                self.created = true;
            }
            MandiEvent::DistanceChanged(e) => {
                self.distance = e.distance;
            }
            MandiEvent::Removed(_) => {
                self.removed = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MandiCommand::Register(cmd) => self.handle_register(cmd),
            MandiCommand::ChangeDistance(cmd) => self.handle_change_distance(cmd),
            MandiCommand::Remove(cmd) => self.handle_remove(cmd),
        }
    }
}

impl Mandi {
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
            return Err(DomainError::invariant("mandi has been removed"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterMandi) -> Result<Vec<MandiEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("mandi already registered"));
        }

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("mandi name must not be empty"));
        }

        Ok(vec![MandiEvent::Registered(MandiRegistered {
            mill_id: cmd.mill_id,
            mandi_id: cmd.mandi_id,
            name: name.to_string(),
            distance: cmd.distance,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_distance(&self, cmd: &ChangeDistance) -> Result<Vec<MandiEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;

        Ok(vec![MandiEvent::DistanceChanged(MandiDistanceChanged {
            mill_id: cmd.mill_id,
            mandi_id: cmd.mandi_id,
            distance: cmd.distance,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveMandi) -> Result<Vec<MandiEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;

        Ok(vec![MandiEvent::Removed(MandiRemoved {
            mill_id: cmd.mill_id,
            mandi_id: cmd.mandi_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millbook_events::execute;

    fn test_mandi_id() -> MandiId {
        MandiId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn register_trims_and_records_name_and_distance() {
        let mandi_id = test_mandi_id();
        let mandi = Mandi::empty(mandi_id);

        let events = mandi
            .handle(&MandiCommand::Register(RegisterMandi {
                mill_id: MillId::new(),
                mandi_id,
                name: "  Gondia Mandi ".to_string(),
                distance: Distance::from_km(42.5).unwrap(),
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            MandiEvent::Registered(e) => {
                assert_eq!(e.name, "Gondia Mandi");
                assert_eq!(e.distance.metres(), 42_500);
            }
            other => panic!("expected Registered, got {other:?}"),
        }
    }

    #[test]
    fn removed_mandi_rejects_further_changes() {
        let mill_id = MillId::new();
        let mandi_id = test_mandi_id();
        let mut mandi = Mandi::empty(mandi_id);

        execute(
            &mut mandi,
            &MandiCommand::Register(RegisterMandi {
                mill_id,
                mandi_id,
                name: "Tumsar".to_string(),
                distance: Distance::from_km(12.0).unwrap(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut mandi,
            &MandiCommand::Remove(RemoveMandi {
                mill_id,
                mandi_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = mandi
            .handle(&MandiCommand::ChangeDistance(ChangeDistance {
                mill_id,
                mandi_id,
                distance: Distance::from_km(13.0).unwrap(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn register_twice_conflicts() {
        let mill_id = MillId::new();
        let mandi_id = test_mandi_id();
        let mut mandi = Mandi::empty(mandi_id);

        let register = RegisterMandi {
            mill_id,
            mandi_id,
            name: "Amgaon".to_string(),
            distance: Distance::from_km(30.0).unwrap(),
            occurred_at: test_time(),
        };
        execute(&mut mandi, &MandiCommand::Register(register.clone())).unwrap();

        let err = mandi.handle(&MandiCommand::Register(register)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
