use axum::{Router, http::Method, routing::get};
use std::error::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod retail;
pub mod sort;
pub mod uploads;
pub mod users;

use handler::AppState;

pub const API_PREFIX: &str = "/api/v1/admin";

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

/// Full router: the admin API under [`API_PREFIX`], `/api` info, the
/// healthcheck and the stored files under `/uploads`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let admin = Router::new()
        .merge(catalog::routes())
        .merge(retail::routes())
        .merge(users::routes())
        .merge(uploads::routes(state.cfg.uploads.max_size));

    Router::new()
        .route("/", get(handler::healthcheck))
        .route("/api", get(handler::api_info))
        .nest(API_PREFIX, admin)
        .nest_service("/uploads", ServeDir::new(state.storage.root()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
