mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

async fn shop_with_book(app: &TestApp) -> (i64, i64) {
    let publisher = app.create_publisher("Tor").await;
    let book = app.create_book("The Way of Kings", publisher, json!({})).await;
    let shop = app.create_shop("Corner Books").await;
    (shop, book)
}

#[tokio::test]
async fn upserts_stock() {
    let app = setup_test_app().await;
    let (shop, book) = shop_with_book(&app).await;
    let url = format!("/shops/{shop}/stocks");

    let (status, body) = app
        .put(&url, payload("stocks", json!({ "book_id": book, "quantity": 4 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["type"], "stocks");
    assert_eq!(body["data"]["attributes"]["quantity"], 4);
    assert_eq!(body["data"]["relationships"]["book"]["data"]["id"], book.to_string());
    let stock_id = id_of(&body["data"]);

    let (_, body) = app
        .put(&url, payload("stocks", json!({ "book_id": book, "quantity": 9 })))
        .await;
    assert_eq!(id_of(&body["data"]), stock_id);

    let (status, body) = app.get(&url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["attributes"]["quantity"], 9);
}

#[tokio::test]
async fn validates_stock() {
    let app = setup_test_app().await;
    let (shop, book) = shop_with_book(&app).await;
    let url = format!("/shops/{shop}/stocks");

    let (status, body) = app
        .put(&url, payload("stocks", json!({ "book_id": book, "quantity": -1 })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(errors_on(&body, "quantity"), ["quantity must be greater than or equal to 0"]);

    let (status, body) = app
        .put(&url, payload("stocks", json!({ "book_id": 999, "quantity": 1 })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(errors_on(&body, "book"), ["book must exist"]);

    let (status, body) = app.put(&url, payload("stocks", json!({ "quantity": 1 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(errors_on(&body, "book"), ["book can't be blank"]);
}

#[tokio::test]
async fn unknown_shop_is_not_found() {
    let app = setup_test_app().await;

    let (status, _) = app.get("/shops/999/stocks").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/shops/nope/sales").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sales_draw_down_stock() {
    let app = setup_test_app().await;
    let (shop, book) = shop_with_book(&app).await;

    app.put(
        &format!("/shops/{shop}/stocks"),
        payload("stocks", json!({ "book_id": book, "quantity": 3 })),
    )
    .await;

    let sales_url = format!("/shops/{shop}/sales");
    let (status, body) = app
        .post(&sales_url, payload("sales", json!({ "book_id": book, "quantity": 2 })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["type"], "sales");
    assert_eq!(body["data"]["attributes"]["quantity"], 2);

    let (status, body) = app
        .post(&sales_url, payload("sales", json!({ "book_id": book, "quantity": 2 })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(errors_on(&body, "quantity"), ["quantity exceeds the copies in stock"]);

    let (status, body) = app
        .post(&sales_url, payload("sales", json!({ "book_id": book, "quantity": 0 })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(errors_on(&body, "quantity"), ["quantity must be greater than or equal to 1"]);

    let (_, body) = app.get(&format!("/shops/{shop}/stocks")).await;
    assert_eq!(body["data"][0]["attributes"]["quantity"], 1);

    let (_, body) = app.get(&sales_url).await;
    assert_eq!(body["meta"]["total"], 1);
}

#[tokio::test]
async fn selling_an_unstocked_book_fails() {
    let app = setup_test_app().await;
    let (shop, book) = shop_with_book(&app).await;

    let (status, body) = app
        .post(
            &format!("/shops/{shop}/sales"),
            payload("sales", json!({ "book_id": book, "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!errors_on(&body, "quantity").is_empty());
}
