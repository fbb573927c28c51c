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
use millbook_registry::{
    RegisterVehicle, RemoveVehicle, UpdateDetails, Vehicle, VehicleCommand, VehicleId,
    normalize_registration,
};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(register_vehicle).get(list_vehicles))
        .route("/:id", get(get_vehicle).put(update_vehicle).delete(remove_vehicle))
}

pub async fn register_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RegisterVehicleRequest>,
) -> axum::response::Response {
    // Normalize up front so the uniqueness check matches what will be stored.
    let registration = match normalize_registration(&body.registration) {
        Ok(r) => r,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };
    if services
        .vehicles()
        .find_by_registration(mill.mill_id(), &registration)
        .is_some()
    {
        return errors::json_error(StatusCode::CONFLICT, "conflict", "vehicle already registered");
    }

    let agg = AggregateId::new();
    let vehicle_id = VehicleId::new(agg);

    let cmd = VehicleCommand::Register(RegisterVehicle {
        mill_id: mill.mill_id(),
        vehicle_id,
        registration,
        owner_name: body.owner_name,
        puc_expiry: body.puc_expiry,
        permit_number: body.permit_number,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.vehicles.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Vehicle>(
            mill.mill_id(),
            agg,
            "registry.vehicle",
            cmd_auth.inner,
            |_m, aggregate_id| Vehicle::empty(VehicleId::new(aggregate_id)),
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

pub async fn update_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateVehicleRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid vehicle id"),
    };

    let cmd = VehicleCommand::UpdateDetails(UpdateDetails {
        mill_id: mill.mill_id(),
        vehicle_id: VehicleId::new(agg),
        owner_name: body.owner_name,
        puc_expiry: body.puc_expiry,
        permit_number: body.permit_number,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.vehicles.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Vehicle>(
            mill.mill_id(),
            agg,
            "registry.vehicle",
            cmd_auth.inner,
            |_m, aggregate_id| Vehicle::empty(VehicleId::new(aggregate_id)),
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

pub async fn remove_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid vehicle id"),
    };

    let cmd = VehicleCommand::Remove(RemoveVehicle {
        mill_id: mill.mill_id(),
        vehicle_id: VehicleId::new(agg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("registry.vehicles.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Vehicle>(
            mill.mill_id(),
            agg,
            "registry.vehicle",
            cmd_auth.inner,
            |_m, aggregate_id| Vehicle::empty(VehicleId::new(aggregate_id)),
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

pub async fn get_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid vehicle id"),
    };

    let today = Utc::now().date_naive();
    match services.vehicles().get(mill.mill_id(), &VehicleId::new(agg)) {
        Some(entry) => (StatusCode::OK, Json(dto::vehicle_to_json(entry, today))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "vehicle not found"),
    }
}

pub async fn list_vehicles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
) -> axum::response::Response {
    let today = Utc::now().date_naive();
    let items = services
        .vehicles()
        .list(mill.mill_id())
        .into_iter()
        .map(|e| dto::vehicle_to_json(e, today))
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
