use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use millbook_auth::{PasswordHash, UserEvent, UserStatus, role_permissions};
use millbook_core::{MillId, UserId};
use millbook_events::EventEnvelope;

use super::{CursorGate, ProjectionApplyError, StreamCursors};
use crate::read_model::MillStore;

pub const AGGREGATE_TYPE: &str = "auth.user";

/// Queryable user record (including the credential hash for login checks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub status: UserStatus,
    pub password: PasswordHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Effective permissions resolved from a user's roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermissions {
    pub user_id: UserId,
    pub mill_id: MillId,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug)]
pub struct UsersProjection<S>
where
    S: MillStore<UserId, UserRecord>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> UsersProjection<S>
where
    S: MillStore<UserId, UserRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, mill_id: MillId, user_id: &UserId) -> Option<UserRecord> {
        self.store.get(mill_id, user_id)
    }

    pub fn list(&self, mill_id: MillId) -> Vec<UserRecord> {
        let mut users = self.store.list(mill_id);
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    pub fn find_by_username(&self, mill_id: MillId, username: &str) -> Option<UserRecord> {
        let needle = username.trim();
        self.store
            .list(mill_id)
            .into_iter()
            .find(|u| u.username == needle)
    }

    /// Union of the permissions granted by each of the user's roles.
    pub fn effective_permissions(
        &self,
        mill_id: MillId,
        user_id: &UserId,
    ) -> Option<EffectivePermissions> {
        let user = self.store.get(mill_id, user_id)?;

        let mut permissions: Vec<String> = user
            .roles
            .iter()
            .flat_map(|r| role_permissions(&millbook_auth::Role::new(r.clone())))
            .map(|p| p.as_str().to_string())
            .collect();
        permissions.sort();
        permissions.dedup();

        Some(EffectivePermissions {
            user_id: user.user_id,
            mill_id,
            roles: user.roles,
            permissions,
        })
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

        let ev: UserEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let (event_mill, user_id) = match &ev {
            UserEvent::Created(e) => (e.mill_id, e.user_id),
            UserEvent::PasswordChanged(e) => (e.mill_id, e.user_id),
            UserEvent::RoleAssigned(e) => (e.mill_id, e.user_id),
            UserEvent::RoleRevoked(e) => (e.mill_id, e.user_id),
            UserEvent::Suspended(e) => (e.mill_id, e.user_id),
            UserEvent::Activated(e) => (e.mill_id, e.user_id),
        };

        if event_mill != mill_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event mill_id does not match envelope mill_id".to_string(),
            ));
        }
        if millbook_core::AggregateId::from(user_id) != aggregate_id {
            return Err(ProjectionApplyError::MillIsolation(
                "event user_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            UserEvent::Created(e) => {
                self.store.upsert(
                    mill_id,
                    e.user_id,
                    UserRecord {
                        user_id: e.user_id,
                        username: e.username,
                        display_name: e.display_name,
                        roles: e.initial_roles.iter().map(|r| r.as_str().to_string()).collect(),
                        status: UserStatus::Active,
                        password: e.password,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            UserEvent::PasswordChanged(e) => {
                if let Some(mut user) = self.store.get(mill_id, &e.user_id) {
                    user.password = e.password;
                    user.updated_at = e.occurred_at;
                    self.store.upsert(mill_id, e.user_id, user);
                }
            }
            UserEvent::RoleAssigned(e) => {
                if let Some(mut user) = self.store.get(mill_id, &e.user_id) {
                    let role = e.role.as_str().to_string();
                    if !user.roles.contains(&role) {
                        user.roles.push(role);
                    }
                    user.updated_at = e.occurred_at;
                    self.store.upsert(mill_id, e.user_id, user);
                }
            }
            UserEvent::RoleRevoked(e) => {
                if let Some(mut user) = self.store.get(mill_id, &e.user_id) {
                    user.roles.retain(|r| r != e.role.as_str());
                    user.updated_at = e.occurred_at;
                    self.store.upsert(mill_id, e.user_id, user);
                }
            }
            UserEvent::Suspended(e) => {
                if let Some(mut user) = self.store.get(mill_id, &e.user_id) {
                    user.status = UserStatus::Suspended;
                    user.updated_at = e.occurred_at;
                    self.store.upsert(mill_id, e.user_id, user);
                }
            }
            UserEvent::Activated(e) => {
                if let Some(mut user) = self.store.get(mill_id, &e.user_id) {
                    user.status = UserStatus::Active;
                    user.updated_at = e.occurred_at;
                    self.store.upsert(mill_id, e.user_id, user);
                }
            }
        }

        self.cursors.advance(mill_id, aggregate_id, seq);
        Ok(())
    }
}
