//! Admin routes for identity management.
//!
//! These endpoints provide mill-scoped user administration with strict
//! privilege escalation prevention.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use millbook_auth::{
    ActivateUser, AssignRole, ChangePassword, CreateUser, PasswordHash, Permission, RevokeRole,
    Role, SuspendUser, User, UserCommand,
};
use millbook_core::{AggregateId, UserId};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{MillContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/:id", get(get_user))
        .route("/users/:id/password", post(set_password))
        .route("/users/:id/roles", post(assign_role))
        .route("/users/:id/roles/:role", axum::routing::delete(revoke_role))
        .route("/users/:id/suspend", post(suspend_user))
        .route("/users/:id/activate", post(activate_user))
        .route("/users/:id/permissions", get(inspect_permissions))
}

fn parse_user_id(id: &str) -> Result<UserId, axum::response::Response> {
    id.parse::<uuid::Uuid>()
        .map(UserId::from_uuid)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"))
}

/// POST /admin/users — create a new user with an initial credential.
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> axum::response::Response {
    if services
        .users()
        .find_by_username(mill.mill_id(), &body.username)
        .is_some()
    {
        return errors::json_error(StatusCode::CONFLICT, "conflict", "username already exists");
    }

    let agg = AggregateId::new();
    let user_id = UserId::from(agg);

    let initial_roles: Vec<Role> = body
        .initial_roles
        .unwrap_or_default()
        .into_iter()
        .map(Role::new)
        .collect();

    // Privilege escalation check: actor cannot create users with roles they
    // don't have (unless actor is admin).
    let actor_is_admin = principal.roles().iter().any(|r| r.as_str() == "admin");
    if !actor_is_admin {
        for role in &initial_roles {
            let actor_has_role = principal.roles().iter().any(|r| r.as_str() == role.as_str());
            if !actor_has_role && role.as_str() != "viewer" {
                return errors::json_error(
                    StatusCode::FORBIDDEN,
                    "privilege_escalation",
                    format!("cannot assign role '{}' that you don't have", role.as_str()),
                );
            }
        }
    }

    let cmd = UserCommand::Create(CreateUser {
        mill_id: mill.mill_id(),
        user_id,
        username: body.username,
        display_name: body.display_name,
        initial_roles,
        password: PasswordHash::derive(&body.password),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("admin.users.create")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<User>(
            mill.mill_id(),
            agg,
            "auth.user",
            cmd_auth.inner,
            |_m, aggregate_id| User::empty(UserId::from(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

/// POST /admin/users/:id/password — replace a user's credential.
pub async fn set_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetPasswordRequest>,
) -> axum::response::Response {
    let user_id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let agg = AggregateId::from(user_id);

    let cmd = UserCommand::ChangePassword(ChangePassword {
        mill_id: mill.mill_id(),
        user_id,
        password: PasswordHash::derive(&body.password),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("admin.users.set_password")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<User>(
            mill.mill_id(),
            agg,
            "auth.user",
            cmd_auth.inner,
            |_m, aggregate_id| User::empty(UserId::from(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": id, "events_committed": committed.len()})),
    )
        .into_response()
}

/// POST /admin/users/:id/roles — assign a role to a user.
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignRoleRequest>,
) -> axum::response::Response {
    let user_id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let agg = AggregateId::from(user_id);

    let cmd = UserCommand::AssignRole(AssignRole {
        mill_id: mill.mill_id(),
        user_id,
        role: Role::new(body.role),
        // The aggregate re-checks escalation against the actor's roles.
        actor_roles: principal.roles().to_vec(),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("admin.users.assign_role")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<User>(
            mill.mill_id(),
            agg,
            "auth.user",
            cmd_auth.inner,
            |_m, aggregate_id| User::empty(UserId::from(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": id, "events_committed": committed.len()})),
    )
        .into_response()
}

/// DELETE /admin/users/:id/roles/:role — revoke a role from a user.
pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, role)): Path<(String, String)>,
) -> axum::response::Response {
    let user_id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let agg = AggregateId::from(user_id);

    let cmd = UserCommand::RevokeRole(RevokeRole {
        mill_id: mill.mill_id(),
        user_id,
        role: Role::new(role),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("admin.users.revoke_role")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<User>(
            mill.mill_id(),
            agg,
            "auth.user",
            cmd_auth.inner,
            |_m, aggregate_id| User::empty(UserId::from(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": id, "events_committed": committed.len()})),
    )
        .into_response()
}

/// POST /admin/users/:id/suspend — suspend a user.
pub async fn suspend_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SuspendUserRequest>,
) -> axum::response::Response {
    let user_id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let agg = AggregateId::from(user_id);

    let cmd = UserCommand::Suspend(SuspendUser {
        mill_id: mill.mill_id(),
        user_id,
        reason: body.reason.unwrap_or_else(|| "No reason provided".to_string()),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("admin.users.suspend")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<User>(
            mill.mill_id(),
            agg,
            "auth.user",
            cmd_auth.inner,
            |_m, aggregate_id| User::empty(UserId::from(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": id, "events_committed": committed.len()})),
    )
        .into_response()
}

/// POST /admin/users/:id/activate — activate a suspended user.
pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let agg = AggregateId::from(user_id);

    let cmd = UserCommand::Activate(ActivateUser {
        mill_id: mill.mill_id(),
        user_id,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("admin.users.activate")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<User>(
            mill.mill_id(),
            agg,
            "auth.user",
            cmd_auth.inner,
            |_m, aggregate_id| User::empty(UserId::from(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": id, "events_committed": committed.len()})),
    )
        .into_response()
}

/// GET /admin/users — list all users in the mill.
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let cmd_auth = CmdAuth::<()> {
        inner: (),
        required: vec![Permission::new("admin.users.list")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let items: Vec<serde_json::Value> = services
        .users()
        .list(mill.mill_id())
        .into_iter()
        .map(dto::user_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// GET /admin/users/:id — get a specific user.
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let cmd_auth = CmdAuth::<()> {
        inner: (),
        required: vec![Permission::new("admin.users.read")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let user_id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.users().get(mill.mill_id(), &user_id) {
        Some(user) => (StatusCode::OK, Json(dto::user_to_json(user))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
    }
}

/// GET /admin/users/:id/permissions — inspect effective permissions.
pub async fn inspect_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<MillContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let cmd_auth = CmdAuth::<()> {
        inner: (),
        required: vec![Permission::new("admin.users.read")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let user_id = match parse_user_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.users().effective_permissions(mill.mill_id(), &user_id) {
        Some(effective) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": effective.user_id.to_string(),
                "mill_id": effective.mill_id.to_string(),
                "roles": effective.roles,
                "permissions": effective.permissions,
            })),
        )
            .into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
    }
}
