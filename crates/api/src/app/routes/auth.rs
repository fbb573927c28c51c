//! Credential login: password-hash comparison against the users read model,
//! then an HS256 token for the dashboard session.

use std::str::FromStr;
use std::sync::Arc;

use axum::{Json, Router, extract::Extension, http::StatusCode, response::IntoResponse, routing::post};
use chrono::{Duration, Utc};

use millbook_auth::{JwtClaims, PrincipalId, Role, UserStatus};
use millbook_core::MillId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

const SESSION_HOURS: i64 = 8;

pub fn router() -> Router {
    Router::new().route("/login", post(login))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    let Ok(mill_id) = MillId::from_str(&body.mill_id) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid mill_id");
    };

    // One rejection path for unknown user / suspended / wrong password, so
    // the response never reveals which check failed.
    let denied =
        || errors::json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid credentials");

    let Some(user) = services.users().find_by_username(mill_id, &body.username) else {
        return denied();
    };
    if user.status != UserStatus::Active {
        return denied();
    }
    if !user.password.verify(&body.password) {
        return denied();
    }

    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::from_uuid(*user.user_id.as_uuid()),
        mill_id,
        roles: user.roles.iter().map(|r| Role::new(r.clone())).collect(),
        issued_at: now,
        expires_at: now + Duration::hours(SESSION_HOURS),
    };

    match services.token_issuer().issue(&claims) {
        Ok(token) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "token": token,
                "expires_at": claims.expires_at.to_rfc3339(),
                "roles": user.roles,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("token issuance failed: {e}");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "token_error", "could not issue token")
        }
    }
}
