use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millbook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, MillId};
use millbook_events::Event;

/// Driver identifier (mill-scoped via `mill_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub AggregateId);

impl DriverId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DriverId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
    id: DriverId,
    mill_id: Option<MillId>,
    name: String,
    phone: Option<String>,
    removed: bool,
    version: u64,
    created: bool,
}

impl Driver {
    pub fn empty(id: DriverId) -> Self {
        Self {
            id,
            mill_id: None,
            name: String::new(),
            phone: None,
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DriverId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

impl AggregateRoot for Driver {
    type Id = DriverId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterDriver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDriver {
    pub mill_id: MillId,
    pub driver_id: DriverId,
    pub name: String,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangePhone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePhone {
    pub mill_id: MillId,
    pub driver_id: DriverId,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveDriver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveDriver {
    pub mill_id: MillId,
    pub driver_id: DriverId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverCommand {
    Register(RegisterDriver),
    ChangePhone(ChangePhone),
    Remove(RemoveDriver),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRegistered {
    pub mill_id: MillId,
    pub driver_id: DriverId,
    pub name: String,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverPhoneChanged {
    pub mill_id: MillId,
    pub driver_id: DriverId,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRemoved {
    pub mill_id: MillId,
    pub driver_id: DriverId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverEvent {
    Registered(DriverRegistered),
    PhoneChanged(DriverPhoneChanged),
    Removed(DriverRemoved),
}

impl Event for DriverEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DriverEvent::Registered(_) => "registry.driver.registered",
            DriverEvent::PhoneChanged(_) => "registry.driver.phone_changed",
            DriverEvent::Removed(_) => "registry.driver.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DriverEvent::Registered(e) => e.occurred_at,
            DriverEvent::PhoneChanged(e) => e.occurred_at,
            DriverEvent::Removed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Driver {
    type Command = DriverCommand;
    type Event = DriverEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DriverEvent::Registered(e) => {
                self.id = e.driver_id;
                self.mill_id = Some(e.mill_id);
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.removed = false;
                self.created = true;
            }
            DriverEvent::PhoneChanged(e) => {
                self.phone = e.phone.clone();
            }
            DriverEvent::Removed(_) => {
                self.removed = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DriverCommand::Register(cmd) => self.handle_register(cmd),
            DriverCommand::ChangePhone(cmd) => self.handle_change_phone(cmd),
            DriverCommand::Remove(cmd) => self.handle_remove(cmd),
        }
    }
}

/// Light shape check: at least 6 digits, only digits/space/`+`/`-` allowed.
fn validate_phone(phone: &str) -> Result<(), DomainError> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '+' || c == '-');
    if digits < 6 || !allowed {
        return Err(DomainError::validation("phone number is malformed"));
    }
    Ok(())
}

impl Driver {
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
            return Err(DomainError::invariant("driver has been removed"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterDriver) -> Result<Vec<DriverEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("driver already registered"));
        }

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("driver name must not be empty"));
        }
        if let Some(phone) = &cmd.phone {
            validate_phone(phone)?;
        }

        Ok(vec![DriverEvent::Registered(DriverRegistered {
            mill_id: cmd.mill_id,
            driver_id: cmd.driver_id,
            name: name.to_string(),
            phone: cmd.phone.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_phone(&self, cmd: &ChangePhone) -> Result<Vec<DriverEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;
        if let Some(phone) = &cmd.phone {
            validate_phone(phone)?;
        }

        Ok(vec![DriverEvent::PhoneChanged(DriverPhoneChanged {
            mill_id: cmd.mill_id,
            driver_id: cmd.driver_id,
            phone: cmd.phone.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveDriver) -> Result<Vec<DriverEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_mill(cmd.mill_id)?;

        Ok(vec![DriverEvent::Removed(DriverRemoved {
            mill_id: cmd.mill_id,
            driver_id: cmd.driver_id,
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

    #[test]
    fn register_accepts_reasonable_phone_numbers() {
        let driver_id = DriverId::new(AggregateId::new());
        let driver = Driver::empty(driver_id);

        let events = driver
            .handle(&DriverCommand::Register(RegisterDriver {
                mill_id: MillId::new(),
                driver_id,
                name: "Ramesh Kumar".to_string(),
                phone: Some("+91 98765-43210".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn malformed_phone_is_rejected() {
        let driver_id = DriverId::new(AggregateId::new());
        let driver = Driver::empty(driver_id);

        let err = driver
            .handle(&DriverCommand::Register(RegisterDriver {
                mill_id: MillId::new(),
                driver_id,
                name: "Ramesh Kumar".to_string(),
                phone: Some("call me".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn phone_can_be_cleared() {
        let mill_id = MillId::new();
        let driver_id = DriverId::new(AggregateId::new());
        let mut driver = Driver::empty(driver_id);

        execute(
            &mut driver,
            &DriverCommand::Register(RegisterDriver {
                mill_id,
                driver_id,
                name: "Sita Devi".to_string(),
                phone: Some("9876543210".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        execute(
            &mut driver,
            &DriverCommand::ChangePhone(ChangePhone {
                mill_id,
                driver_id,
                phone: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(driver.phone(), None);
    }
}
