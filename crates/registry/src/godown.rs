use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, MillId, Quantity};
use millbook_events::Event;

/// Godown (storage warehouse) identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GodownId(pub AggregateId);

impl GodownId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for GodownId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Godown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Godown {
    id: GodownId,
    mill_id: Option<MillId>,
    name: String,
    capacity: Quantity,
    removed: bool,
    version: u64,
    created: bool,
}

impl Godown {
    pub fn empty(id: GodownId) -> Self {
        Self {
            id,
            mill_id: None,
            name: String::new(),
            capacity: Quantity::ZERO,
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> GodownId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> Quantity {
        self.capacity
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

impl AggregateRoot for Godown {
    type Id = GodownId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterGodown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterGodown {
    pub mill_id: MillId,
    pub godown_id: GodownId,
    pub name: String,
    pub capacity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeCapacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCapacity {
    pub mill_id: MillId,
    pub godown_id: GodownId,
    pub capacity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveGodown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveGodown {
    pub mill_id: MillId,
    pub godown_id: GodownId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GodownCommand {
    Register(RegisterGodown),
    ChangeCapacity(ChangeCapacity),
    Remove(RemoveGodown),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GodownRegistered {
    pub mill_id: MillId,
    pub godown_id: GodownId,
    pub name: String,
    pub capacity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GodownCapacityChanged {
    pub mill_id: MillId,
    pub godown_id: GodownId,
    pub capacity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GodownRemoved {
    pub mill_id: MillId,
    pub godown_id: GodownId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GodownEvent {
    Registered(GodownRegistered),
    CapacityChanged(GodownCapacityChanged),
    Removed(GodownRemoved),
}

impl Event for GodownEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GodownEvent::Registered(_) => "registry.godown.registered",
            GodownEvent::CapacityChanged(_) => "registry.godown.capacity_changed",
            GodownEvent::Removed(_) => "registry.godown.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GodownEvent::Registered(e) => e.occurred_at,
            GodownEvent::CapacityChanged(e) => e.occurred_at,
            GodownEvent::Removed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Godown {
    type Command = GodownCommand;
    type Event = GodownEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GodownEvent::Registered(e) => {
                self.id = e.godown_id;
                self.mill_id = Some(e.mill_id);
                self.name = e.name.clone();
                self.capacity = e.capacity;
                self.removed = false;
                self.created = true;
            }
            GodownEvent::CapacityChanged(e) => {
                self.capacity = e.capacity;
            }
            GodownEvent::Removed(_) => {
                self.removed = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GodownCommand::Register(cmd) => self.handle_register(cmd),
            GodownCommand::ChangeCapacity(cmd) => self.handle_change_capacity(cmd),
            GodownCommand::Remove(cmd) => self.handle_remove(cmd),
        }
    }
}

impl Godown {
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
            return Err(DomainError::invariant("godown has been removed"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterGodown) -> Result<Vec<GodownEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("godown already registered"));
        }

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("godown name must not be empty"));
        }
        if !cmd.capacity.is_positive() {
            return Err(DomainError::validation("godown capacity must be positive"));
        }

        Ok(vec![GodownEvent::Registered(GodownRegistered {
            mill_id: cmd.mill_id,
            godown_id: cmd.godown_id,
            name: name.to_string(),
            capacity: cmd.capacity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_capacity(&self, cmd: &ChangeCapacity) -> Result<Vec<GodownEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;

        if !cmd.capacity.is_positive() {
            return Err(DomainError::validation("godown capacity must be positive"));
        }

        Ok(vec![GodownEvent::CapacityChanged(GodownCapacityChanged {
            mill_id: cmd.mill_id,
            godown_id: cmd.godown_id,
            capacity: cmd.capacity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveGodown) -> Result<Vec<GodownEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;

        Ok(vec![GodownEvent::Removed(GodownRemoved {
            mill_id: cmd.mill_id,
            godown_id: cmd.godown_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let godown_id = GodownId::new(AggregateId::new());
        let godown = Godown::empty(godown_id);

        let err = godown
            .handle(&GodownCommand::Register(RegisterGodown {
                mill_id: MillId::new(),
                godown_id,
                name: "Godown A".to_string(),
                capacity: Quantity::ZERO,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_emits_registered_event() {
        let godown_id = GodownId::new(AggregateId::new());
        let godown = Godown::empty(godown_id);

        let events = godown
            .handle(&GodownCommand::Register(RegisterGodown {
                mill_id: MillId::new(),
                godown_id,
                name: "Godown A".to_string(),
                capacity: Quantity::from_quintals(5_000),
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            GodownEvent::Registered(e) => assert_eq!(e.capacity.as_quintals(), 5_000.0),
            other => panic!("expected Registered, got {other:?}"),
        }
    }
}
