use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use super::handler;
use crate::handler::AppState;

/// `max_size` caps the multipart body of `POST /uploads`.
pub fn routes(max_size: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/uploads",
            post(handler::create_upload).layer(DefaultBodyLimit::max(max_size)),
        )
        .route("/uploads/:id", get(handler::get_upload).delete(handler::delete_upload))
}
