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
use millbook_core::{AggregateId, Distance};
use millbook_registry::{
    ChangeDistance, Mandi, MandiCommand, MandiId, RegisterMandi, RemoveMandi,
};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(register_mandi).get(list_mandis))
        .route("/:id", get(get_mandi).delete(remove_mandi))
        .route("/:id/distance", axum::routing::post(change_distance))
}

pub async fn register_mandi(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RegisterMandiRequest>,
) -> axum::response::Response {
    let distance = match Distance::from_km(body.distance_km) {
        Ok(d) => d,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    // Per-mill name uniqueness lives at the read-model boundary.
    if services.mandis().find_by_name(mill.mill_id(), &body.name).is_some() {
        return errors::json_error(StatusCode::CONFLICT, "conflict", "mandi name already exists");
    }

    let agg = AggregateId::new();
    let mandi_id = MandiId::new(agg);

    let cmd = MandiCommand::Register(RegisterMandi {
        mill_id: mill.mill_id(),
        mandi_id,
        name: body.name,
        distance,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.mandis.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Mandi>(
            mill.mill_id(),
            agg,
            "registry.mandi",
            cmd_auth.inner,
            |_m, aggregate_id| Mandi::empty(MandiId::new(aggregate_id)),
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

pub async fn change_distance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeDistanceRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid mandi id"),
    };
    let distance = match Distance::from_km(body.distance_km) {
        Ok(d) => d,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    let cmd = MandiCommand::ChangeDistance(ChangeDistance {
        mill_id: mill.mill_id(),
        mandi_id: MandiId::new(agg),
        distance,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.mandis.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Mandi>(
            mill.mill_id(),
            agg,
            "registry.mandi",
            cmd_auth.inner,
            |_m, aggregate_id| Mandi::empty(MandiId::new(aggregate_id)),
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

pub async fn remove_mandi(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid mandi id"),
    };

    let cmd = MandiCommand::Remove(RemoveMandi {
        mill_id: mill.mill_id(),
        mandi_id: MandiId::new(agg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.mandis.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Mandi>(
            mill.mill_id(),
            agg,
            "registry.mandi",
            cmd_auth.inner,
            |_m, aggregate_id| Mandi::empty(MandiId::new(aggregate_id)),
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

pub async fn get_mandi(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid mandi id"),
    };

    match services.mandis().get(mill.mill_id(), &MandiId::new(agg)) {
        Some(entry) => (StatusCode::OK, Json(dto::mandi_to_json(entry))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "mandi not found"),
    }
}

pub async fn list_mandis(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
) -> axum::response::Response {
    let items = services
        .mandis()
        .list(mill.mill_id())
        .into_iter()
        .map(dto::mandi_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
