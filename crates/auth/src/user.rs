//! User aggregate for identity management (event-sourced).
//!
//! # Invariants
//! - A user belongs to exactly one mill (mill_id is immutable after creation).
//! - Usernames are non-empty; uniqueness per mill is enforced at the read-model boundary.
//! - Suspended users cannot be assigned new roles or change passwords.
//! - Actors cannot grant roles they do not hold themselves (admins excepted).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millbook_core::{Aggregate, AggregateRoot, DomainError, MillId, UserId};
use millbook_events::Event;

use crate::{PasswordHash, Role};

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// User is active and can authenticate/transact.
    #[default]
    Active,
    /// User is suspended and cannot authenticate.
    Suspended,
}

/// User aggregate for identity management.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    mill_id: Option<MillId>,
    username: String,
    display_name: String,
    roles: Vec<Role>,
    status: UserStatus,
    password: Option<PasswordHash>,
    version: u64,
    created: bool,
}

impl User {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            mill_id: None,
            username: String::new(),
            display_name: String::new(),
            roles: Vec::new(),
            status: UserStatus::Active,
            password: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> UserId {
        self.id
    }

    pub fn mill_id(&self) -> Option<MillId> {
        self.mill_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn password(&self) -> Option<&PasswordHash> {
        self.password.as_ref()
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: create a new user with an initial credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUser {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub initial_roles: Vec<Role>,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

/// Command: replace the user's password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePassword {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

/// Command: assign a role to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRole {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub role: Role,
    /// The roles of the actor performing this operation (for escalation check).
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: revoke a role from a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRole {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command: suspend a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendUser {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: activate a suspended user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateUser {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    ChangePassword(ChangePassword),
    AssignRole(AssignRole),
    RevokeRole(RevokeRole),
    Suspend(SuspendUser),
    Activate(ActivateUser),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub initial_roles: Vec<Role>,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub password: PasswordHash,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssigned {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRevoked {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSuspended {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivated {
    pub mill_id: MillId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    PasswordChanged(PasswordChanged),
    RoleAssigned(RoleAssigned),
    RoleRevoked(RoleRevoked),
    Suspended(UserSuspended),
    Activated(UserActivated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::PasswordChanged(_) => "auth.user.password_changed",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::RoleRevoked(_) => "auth.user.role_revoked",
            UserEvent::Suspended(_) => "auth.user.suspended",
            UserEvent::Activated(_) => "auth.user.activated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::PasswordChanged(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) => e.occurred_at,
            UserEvent::RoleRevoked(e) => e.occurred_at,
            UserEvent::Suspended(e) => e.occurred_at,
            UserEvent::Activated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.mill_id = Some(e.mill_id);
                self.username = e.username.clone();
                self.display_name = e.display_name.clone();
                self.roles = e.initial_roles.clone();
                self.status = UserStatus::Active;
                self.password = Some(e.password.clone());
                self.created = true;
            }
            UserEvent::PasswordChanged(e) => {
                self.password = Some(e.password.clone());
            }
            UserEvent::RoleAssigned(e) => {
                if !self.roles.contains(&e.role) {
                    self.roles.push(e.role.clone());
                }
            }
            UserEvent::RoleRevoked(e) => {
                self.roles.retain(|r| r != &e.role);
            }
            UserEvent::Suspended(_) => {
                self.status = UserStatus::Suspended;
            }
            UserEvent::Activated(_) => {
                self.status = UserStatus::Active;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::ChangePassword(cmd) => self.handle_change_password(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
            UserCommand::Suspend(cmd) => self.handle_suspend(cmd),
            UserCommand::Activate(cmd) => self.handle_activate(cmd),
        }
    }
}

impl User {
    fn ensure_mill(&self, mill_id: MillId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.mill_id != Some(mill_id) {
            return Err(DomainError::invariant("mill mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_not_suspended(&self) -> Result<(), DomainError> {
        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user is suspended"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        if cmd.username.trim().is_empty() {
            return Err(DomainError::validation("username must not be empty"));
        }

        Ok(vec![UserEvent::Created(UserCreated {
            mill_id: cmd.mill_id,
            user_id: cmd.user_id,
            username: cmd.username.trim().to_string(),
            display_name: cmd.display_name.clone(),
            initial_roles: cmd.initial_roles.clone(),
            password: cmd.password.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_password(&self, cmd: &ChangePassword) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_mill(cmd.mill_id)?;
        self.ensure_not_suspended()?;

        Ok(vec![UserEvent::PasswordChanged(PasswordChanged {
            mill_id: cmd.mill_id,
            user_id: cmd.user_id,
            password: cmd.password.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_mill(cmd.mill_id)?;
        self.ensure_not_suspended()?;

        if self.roles.contains(&cmd.role) {
            return Err(DomainError::conflict("role already assigned"));
        }

        // Privilege escalation guard: non-admin actors can only grant roles
        // they hold themselves.
        let actor_is_admin = cmd.actor_roles.iter().any(|r| r.as_str() == "admin");
        if !actor_is_admin && !cmd.actor_roles.contains(&cmd.role) {
            return Err(DomainError::Unauthorized);
        }

        Ok(vec![UserEvent::RoleAssigned(RoleAssigned {
            mill_id: cmd.mill_id,
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_mill(cmd.mill_id)?;

        if !self.roles.contains(&cmd.role) {
            return Err(DomainError::validation("role is not assigned"));
        }

        Ok(vec![UserEvent::RoleRevoked(RoleRevoked {
            mill_id: cmd.mill_id,
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_mill(cmd.mill_id)?;

        if self.status == UserStatus::Suspended {
            return Err(DomainError::conflict("user is already suspended"));
        }

        Ok(vec![UserEvent::Suspended(UserSuspended {
            mill_id: cmd.mill_id,
            user_id: cmd.user_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_mill(cmd.mill_id)?;

        if self.status == UserStatus::Active {
            return Err(DomainError::conflict("user is already active"));
        }

        Ok(vec![UserEvent::Activated(UserActivated {
            mill_id: cmd.mill_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millbook_events::execute;

    fn test_mill_id() -> MillId {
        MillId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_user(mill_id: MillId, user_id: UserId, roles: Vec<Role>) -> User {
        let mut user = User::empty(user_id);
        execute(
            &mut user,
            &UserCommand::Create(CreateUser {
                mill_id,
                user_id,
                username: "weighbridge".to_string(),
                display_name: "Weighbridge Desk".to_string(),
                initial_roles: roles,
                password: PasswordHash::derive("initial"),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        user
    }

    #[test]
    fn create_emits_created_event_with_credential() {
        let mill_id = test_mill_id();
        let user_id = UserId::new();
        let user = User::empty(user_id);

        let events = user
            .handle(&UserCommand::Create(CreateUser {
                mill_id,
                user_id,
                username: "  weighbridge  ".to_string(),
                display_name: "Weighbridge Desk".to_string(),
                initial_roles: vec![Role::new("operator")],
                password: PasswordHash::derive("initial"),
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            UserEvent::Created(e) => {
                assert_eq!(e.username, "weighbridge");
                assert!(e.password.verify("initial"));
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn empty_username_is_rejected() {
        let user_id = UserId::new();
        let user = User::empty(user_id);
        let err = user
            .handle(&UserCommand::Create(CreateUser {
                mill_id: test_mill_id(),
                user_id,
                username: "   ".to_string(),
                display_name: String::new(),
                initial_roles: vec![],
                password: PasswordHash::derive("x"),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_admin_cannot_escalate_roles() {
        let mill_id = test_mill_id();
        let user_id = UserId::new();
        let user = created_user(mill_id, user_id, vec![]);

        let err = user
            .handle(&UserCommand::AssignRole(AssignRole {
                mill_id,
                user_id,
                role: Role::new("manager"),
                actor_roles: vec![Role::new("operator")],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[test]
    fn suspended_user_cannot_change_password() {
        let mill_id = test_mill_id();
        let user_id = UserId::new();
        let mut user = created_user(mill_id, user_id, vec![]);

        execute(
            &mut user,
            &UserCommand::Suspend(SuspendUser {
                mill_id,
                user_id,
                reason: "left the mill".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = user
            .handle(&UserCommand::ChangePassword(ChangePassword {
                mill_id,
                user_id,
                password: PasswordHash::derive("new"),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn suspend_then_activate_round_trips() {
        let mill_id = test_mill_id();
        let user_id = UserId::new();
        let mut user = created_user(mill_id, user_id, vec![Role::new("viewer")]);

        execute(
            &mut user,
            &UserCommand::Suspend(SuspendUser {
                mill_id,
                user_id,
                reason: "seasonal".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(user.status(), UserStatus::Suspended);

        execute(
            &mut user,
            &UserCommand::Activate(ActivateUser {
                mill_id,
                user_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(user.status(), UserStatus::Active);
    }
}
