use axum::{Router, routing::get};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shops/:id/stocks", get(handler::list_stocks).put(handler::set_stock))
        .route("/shops/:id/sales", get(handler::list_sales).post(handler::create_sale))
}
