//! API-side authorization guard for commands.
//!
//! This enforces authorization at the command boundary (before dispatch),
//! while keeping domain aggregates and infra auth-agnostic.

use millbook_auth::{
    AuthzError, CommandAuthorization, MillMembership, Permission, Principal, authorize,
    role_permissions,
};

use crate::context::{MillContext, PrincipalContext};

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(
    mill: &MillContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = MillMembership {
        mill_id: mill.mill_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_mill_id: mill.mill_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

fn permissions_from_roles(roles: &[millbook_auth::Role]) -> Vec<Permission> {
    let mut permissions: Vec<Permission> = roles.iter().flat_map(role_permissions).collect();
    permissions.dedup();
    permissions
}
