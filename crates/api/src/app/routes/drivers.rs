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
use millbook_core::AggregateId;
use millbook_registry::{ChangePhone, Driver, DriverCommand, DriverId, RegisterDriver, RemoveDriver};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(register_driver).get(list_drivers))
        .route("/:id", get(get_driver).delete(remove_driver))
        .route("/:id/phone", axum::routing::post(change_phone))
}

pub async fn register_driver(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RegisterDriverRequest>,
) -> axum::response::Response {
    if services.drivers().find_by_name(mill.mill_id(), &body.name).is_some() {
        return errors::json_error(StatusCode::CONFLICT, "conflict", "driver name already exists");
    }

    let agg = AggregateId::new();
    let driver_id = DriverId::new(agg);

    let cmd = DriverCommand::Register(RegisterDriver {
        mill_id: mill.mill_id(),
        driver_id,
        name: body.name,
        phone: body.phone,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.drivers.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Driver>(
            mill.mill_id(),
            agg,
            "registry.driver",
            cmd_auth.inner,
            |_m, aggregate_id| Driver::empty(DriverId::new(aggregate_id)),
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

pub async fn change_phone(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangePhoneRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid driver id"),
    };

    let cmd = DriverCommand::ChangePhone(ChangePhone {
        mill_id: mill.mill_id(),
        driver_id: DriverId::new(agg),
        phone: body.phone,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.drivers.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Driver>(
            mill.mill_id(),
            agg,
            "registry.driver",
            cmd_auth.inner,
            |_m, aggregate_id| Driver::empty(DriverId::new(aggregate_id)),
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

pub async fn remove_driver(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid driver id"),
    };

    let cmd = DriverCommand::Remove(RemoveDriver {
        mill_id: mill.mill_id(),
        driver_id: DriverId::new(agg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.drivers.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Driver>(
            mill.mill_id(),
            agg,
            "registry.driver",
            cmd_auth.inner,
            |_m, aggregate_id| Driver::empty(DriverId::new(aggregate_id)),
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

pub async fn get_driver(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid driver id"),
    };

    match services.drivers().get(mill.mill_id(), &DriverId::new(agg)) {
        Some(entry) => (StatusCode::OK, Json(dto::driver_to_json(entry))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "driver not found"),
    }
}

pub async fn list_drivers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
) -> axum::response::Response {
    let items = services
        .drivers()
        .list(mill.mill_id())
        .into_iter()
        .map(dto::driver_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
