use axum::{Router, routing::get};

pub mod admin;
pub mod arrivals;
pub mod auth;
pub mod common;
pub mod drivers;
pub mod godowns;
pub mod mandis;
pub mod stock;
pub mod system;
pub mod vehicles;

/// Router for all authenticated (mill-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/mandis", mandis::router())
        .nest("/drivers", drivers::router())
        .nest("/vehicles", vehicles::router())
        .nest("/godowns", godowns::router())
        .nest("/arrivals", arrivals::router())
        .nest("/stock", stock::router())
        .nest("/admin", admin::router())
}
