use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use millbook_auth::Permission;
use millbook_core::{AggregateId, Distance, MillId, Quantity};
use millbook_procurement::{
    AmendArrival, Arrival, ArrivalCommand, ArrivalDetails, ArrivalId, DeleteArrival,
    DriverSnapshot, MandiSnapshot, RecordArrival, VehicleSnapshot,
};
use millbook_registry::{DriverId, MandiId, VehicleId};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", axum::routing::post(record_arrival).get(list_arrivals))
        .route("/:id", get(get_arrival).put(amend_arrival).delete(delete_arrival))
}

/// Resolve the form's picker ids against the registry read models and build
/// the denormalized snapshot the arrival will carry.
fn build_details(
    services: &AppServices,
    mill_id: MillId,
    ac_note: Option<String>,
    mandi_id: &str,
    distance_km: Option<f64>,
    vehicle_id: &str,
    driver_id: &str,
    bag_count: u32,
    weight_kg: i64,
) -> Result<ArrivalDetails, axum::response::Response> {
    let mandi_agg: AggregateId = mandi_id
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid mandi_id"))?;
    let vehicle_agg: AggregateId = vehicle_id
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid vehicle_id"))?;
    let driver_agg: AggregateId = driver_id
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid driver_id"))?;

    let mandi = services
        .mandis()
        .get(mill_id, &MandiId::new(mandi_agg))
        .ok_or_else(|| errors::json_error(StatusCode::BAD_REQUEST, "unknown_mandi", "mandi is not registered"))?;
    let vehicle = services
        .vehicles()
        .get(mill_id, &VehicleId::new(vehicle_agg))
        .ok_or_else(|| {
            errors::json_error(StatusCode::BAD_REQUEST, "unknown_vehicle", "vehicle is not registered")
        })?;
    let driver = services
        .drivers()
        .get(mill_id, &DriverId::new(driver_agg))
        .ok_or_else(|| errors::json_error(StatusCode::BAD_REQUEST, "unknown_driver", "driver is not registered"))?;

    // The form pre-fills the mandi's distance but lets the clerk override it.
    let distance = match distance_km {
        Some(km) => Distance::from_km(km)
            .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()))?,
        None => mandi.distance,
    };

    Ok(ArrivalDetails {
        ac_note,
        mandi: MandiSnapshot {
            mandi_id: mandi.mandi_id,
            name: mandi.name,
            distance,
        },
        vehicle: VehicleSnapshot {
            vehicle_id: vehicle.vehicle_id,
            registration: vehicle.registration,
        },
        driver: DriverSnapshot {
            driver_id: driver.driver_id,
            name: driver.name,
        },
        bag_count,
        weight: Quantity::from_kg(weight_kg),
    })
}

pub async fn record_arrival(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RecordArrivalRequest>,
) -> axum::response::Response {
    let season = match errors::parse_season(&body.season) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let details = match build_details(
        &services,
        mill.mill_id(),
        body.ac_note,
        &body.mandi_id,
        body.distance_km,
        &body.vehicle_id,
        &body.driver_id,
        body.bag_count,
        body.weight_kg,
    ) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let agg = AggregateId::new();
    let arrival_id = ArrivalId::new(agg);
    let within_tolerance = details.within_tolerance();

    let cmd = ArrivalCommand::Record(RecordArrival {
        mill_id: mill.mill_id(),
        arrival_id,
        date: body.date,
        season,
        details,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("procurement.arrivals.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Arrival>(
            mill.mill_id(),
            agg,
            "procurement.arrival",
            cmd_auth.inner,
            |_m, aggregate_id| Arrival::empty(ArrivalId::new(aggregate_id)),
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
            "within_tolerance": within_tolerance,
        })),
    )
        .into_response()
}

pub async fn amend_arrival(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AmendArrivalRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid arrival id"),
    };

    let details = match build_details(
        &services,
        mill.mill_id(),
        body.ac_note,
        &body.mandi_id,
        body.distance_km,
        &body.vehicle_id,
        &body.driver_id,
        body.bag_count,
        body.weight_kg,
    ) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let cmd = ArrivalCommand::Amend(AmendArrival {
        mill_id: mill.mill_id(),
        arrival_id: ArrivalId::new(agg),
        details,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("procurement.arrivals.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Arrival>(
            mill.mill_id(),
            agg,
            "procurement.arrival",
            cmd_auth.inner,
            |_m, aggregate_id| Arrival::empty(ArrivalId::new(aggregate_id)),
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

pub async fn delete_arrival(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid arrival id"),
    };

    let cmd = ArrivalCommand::Delete(DeleteArrival {
        mill_id: mill.mill_id(),
        arrival_id: ArrivalId::new(agg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("procurement.arrivals.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<Arrival>(
            mill.mill_id(),
            agg,
            "procurement.arrival",
            cmd_auth.inner,
            |_m, aggregate_id| Arrival::empty(ArrivalId::new(aggregate_id)),
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

pub async fn get_arrival(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid arrival id"),
    };

    match services.arrivals().get(mill.mill_id(), &ArrivalId::new(agg)) {
        Some(entry) => (StatusCode::OK, Json(dto::arrival_to_json(entry))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "arrival not found"),
    }
}

pub async fn list_arrivals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Query(query): Query<dto::SeasonQuery>,
) -> axum::response::Response {
    let season = match errors::parse_season(&query.season) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let items = services
        .arrivals()
        .list_for_season(mill.mill_id(), season)
        .into_iter()
        .map(dto::arrival_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
