use axum::{
    Router,
    routing::get,
};

use super::handler;
use super::{GenreKind, PublisherKind, ShopKind};
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/authors", get(handler::list_authors).post(handler::create_author))
        .route(
            "/authors/:id",
            get(handler::get_author)
                .put(handler::update_author)
                .delete(handler::delete_author),
        )
        .route("/books", get(handler::list_books).post(handler::create_book))
        .route(
            "/books/:id",
            get(handler::get_book)
                .put(handler::update_book)
                .delete(handler::delete_book),
        )
        .route(
            "/publishers",
            get(handler::list_named::<PublisherKind>).post(handler::create_named::<PublisherKind>),
        )
        .route(
            "/publishers/:id",
            get(handler::get_named::<PublisherKind>)
                .put(handler::update_named::<PublisherKind>)
                .delete(handler::delete_named::<PublisherKind>),
        )
        .route(
            "/shops",
            get(handler::list_named::<ShopKind>).post(handler::create_named::<ShopKind>),
        )
        .route(
            "/shops/:id",
            get(handler::get_named::<ShopKind>)
                .put(handler::update_named::<ShopKind>)
                .delete(handler::delete_named::<ShopKind>),
        )
        .route(
            "/genres",
            get(handler::list_named::<GenreKind>).post(handler::create_named::<GenreKind>),
        )
        .route(
            "/genres/:id",
            get(handler::get_named::<GenreKind>)
                .put(handler::update_named::<GenreKind>)
                .delete(handler::delete_named::<GenreKind>),
        )
}
