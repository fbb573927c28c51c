use std::collections::HashSet;

use thiserror::Error;

use millbook_core::MillId;

use crate::{MillMembership, Permission, PrincipalId, Role};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the API derives memberships from claims and the role policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_mill_id: MillId,
    pub membership: MillMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("mill mismatch")]
    MillMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// Implement this on commands that require permissions.
/// The API layer should enforce these requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active mill context.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_mill_id != principal.membership.mill_id {
        return Err(AuthzError::MillMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Role → permission policy for mill staff.
///
/// - `admin`: everything (wildcard), including user administration.
/// - `manager`: reference-data, arrival and stock writes + all reads.
/// - `operator`: arrival and stock writes + all reads (gate/weighbridge duty).
/// - `viewer`: reads only.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::new("*")],
        "manager" => vec![
            Permission::new("registry.mandis.write"),
            Permission::new("registry.drivers.write"),
            Permission::new("registry.vehicles.write"),
            Permission::new("registry.godowns.write"),
            Permission::new("procurement.arrivals.write"),
            Permission::new("stock.book.write"),
            Permission::new("read"),
        ],
        "operator" => vec![
            Permission::new("procurement.arrivals.write"),
            Permission::new("stock.book.write"),
            Permission::new("read"),
        ],
        "viewer" => vec![Permission::new("read")],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal_with(roles: &[&'static str]) -> Principal {
        let mill_id = MillId::new();
        let roles: Vec<Role> = roles.iter().map(|r| Role::new(*r)).collect();
        let permissions = roles.iter().flat_map(role_permissions).collect();
        Principal {
            principal_id: PrincipalId::new(),
            active_mill_id: mill_id,
            membership: MillMembership {
                mill_id,
                roles,
                permissions,
            },
        }
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let p = principal_with(&["admin"]);
        assert!(authorize(&p, &Permission::new("procurement.arrivals.write")).is_ok());
        assert!(authorize(&p, &Permission::new("admin.users.create")).is_ok());
    }

    #[test]
    fn operator_cannot_touch_registry() {
        let p = principal_with(&["operator"]);
        assert!(authorize(&p, &Permission::new("procurement.arrivals.write")).is_ok());
        assert!(matches!(
            authorize(&p, &Permission::new("registry.mandis.write")),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn mill_mismatch_is_rejected_before_permissions() {
        let mut p = principal_with(&["admin"]);
        p.active_mill_id = MillId::new();
        assert_eq!(
            authorize(&p, &Permission::new("read")),
            Err(AuthzError::MillMismatch)
        );
    }
}
