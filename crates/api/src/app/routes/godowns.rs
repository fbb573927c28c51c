use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use millbook_auth::Permission;
use millbook_core::{AggregateId, Quantity};
use millbook_registry::{
    ChangeCapacity, Godown, GodownCommand, GodownId, RegisterGodown, RemoveGodown,
};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(register_godown).get(list_godowns))
        .route("/:id", get(get_godown).delete(remove_godown))
        .route("/:id/capacity", axum::routing::post(change_capacity))
}

pub async fn register_godown(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RegisterGodownRequest>,
) -> axum::response::Response {
    if services.godowns().find_by_name(mill.mill_id(), &body.name).is_some() {
        return errors::json_error(StatusCode::CONFLICT, "conflict", "godown name already exists");
    }

    let agg = AggregateId::new();
    let godown_id = GodownId::new(agg);

    let cmd = GodownCommand::Register(RegisterGodown {
        mill_id: mill.mill_id(),
        godown_id,
        name: body.name,
        capacity: Quantity::from_quintals(body.capacity_quintals),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.godowns.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Godown>(
            mill.mill_id(),
            agg,
            "registry.godown",
            cmd_auth.inner,
            |_m, aggregate_id| Godown::empty(GodownId::new(aggregate_id)),
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

pub async fn change_capacity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeCapacityRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid godown id"),
    };

    let cmd = GodownCommand::ChangeCapacity(ChangeCapacity {
        mill_id: mill.mill_id(),
        godown_id: GodownId::new(agg),
        capacity: Quantity::from_quintals(body.capacity_quintals),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.godowns.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Godown>(
            mill.mill_id(),
            agg,
            "registry.godown",
            cmd_auth.inner,
            |_m, aggregate_id| Godown::empty(GodownId::new(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": agg.to_string(), "events_committed": committed.len()})),
    )
        .into_response()
}

pub async fn remove_godown(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid godown id"),
    };

    let cmd = GodownCommand::Remove(RemoveGodown {
        mill_id: mill.mill_id(),
        godown_id: GodownId::new(agg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.godowns.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Godown>(
            mill.mill_id(),
            agg,
            "registry.godown",
            cmd_auth.inner,
            |_m, aggregate_id| Godown::empty(GodownId::new(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({"id": agg.to_string(), "events_committed": committed.len()})),
    )
        .into_response()
}

pub async fn get_godown(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid godown id"),
    };

    match services.godowns().get(mill.mill_id(), &GodownId::new(agg)) {
        Some(entry) => (StatusCode::OK, Json(dto::godown_to_json(entry))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "godown not found"),
    }
}

pub async fn list_godowns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
) -> axum::response::Response {
    let items = services
        .godowns()
        .list(mill.mill_id())
        .into_iter()
        .map(dto::godown_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
