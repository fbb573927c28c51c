use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use millbook_auth::Permission;
use millbook_core::Quantity;
use millbook_stock::{BookId, RecordIssue, SeedOpening, StockBook, StockBookCommand};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/register", get(get_register))
        .route("/opening", post(seed_opening))
        .route("/issues", post(record_issue))
}

/// GET /stock/register?season=2024-25 — the computed daily register.
pub async fn get_register(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Query(query): Query<dto::SeasonQuery>,
) -> axum::response::Response {
    let season = match errors::parse_season(&query.season) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.stock().get(mill.mill_id(), &season) {
        Some(register) => (StatusCode::OK, Json(dto::register_to_json(&register))).into_response(),
        // No activity yet: an empty register, not an error.
        None => (
            StatusCode::OK,
            Json(serde_json::json!({
                "season": season.label(),
                "rows": [],
                "summary": null,
            })),
        )
            .into_response(),
    }
}

pub async fn seed_opening(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::SeedOpeningRequest>,
) -> axum::response::Response {
    let season = match errors::parse_season(&body.season) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let book_id = BookId::for_season(mill.mill_id(), season);

    let cmd = StockBookCommand::SeedOpening(SeedOpening {
        mill_id: mill.mill_id(),
        book_id,
        season,
        date: body.date,
        quantity: Quantity::from_kg(body.quantity_kg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("stock.book.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<StockBook>(
            mill.mill_id(),
            book_id.0,
            "stock.book",
            cmd_auth.inner,
            |_m, aggregate_id| StockBook::empty(BookId::new(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "book_id": book_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn record_issue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(mill): Extension<crate::context::MillContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::RecordIssueRequest>,
) -> axum::response::Response {
    let season = match errors::parse_season(&body.season) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let book_id = BookId::for_season(mill.mill_id(), season);

    let cmd = StockBookCommand::RecordIssue(RecordIssue {
        mill_id: mill.mill_id(),
        book_id,
        season,
        date: body.date,
        quantity: Quantity::from_kg(body.quantity_kg),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("stock.book.write")],
    };
    if let Err(e) = crate::authz::authorize_command(&mill, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match services
        .dispatch::<StockBook>(
            mill.mill_id(),
            book_id.0,
            "stock.book",
            cmd_auth.inner,
            |_m, aggregate_id| StockBook::empty(BookId::new(aggregate_id)),
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "book_id": book_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}
