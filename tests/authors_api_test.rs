mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::{Value, json};

const AUTHOR_KEYS: [&str; 7] = [
    "biography",
    "born_in",
    "created_at",
    "died_in",
    "first_name",
    "last_name",
    "updated_at",
];

fn sorted_keys(value: &Value) -> Vec<String> {
    let mut keys: Vec<String> = value.as_object().expect("object").keys().cloned().collect();
    keys.sort();
    keys
}

fn last_names(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .expect("collection")
        .iter()
        .map(|a| a["attributes"]["last_name"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Ten authors `fn-v1`/`ln-v1` .. `fn-v10`/`ln-v10`, in creation order.
async fn seed_authors(app: &TestApp) -> Vec<i64> {
    let mut ids = Vec::new();
    for n in 1..=10 {
        ids.push(app.create_author(&format!("fn-v{n}"), &format!("ln-v{n}")).await);
    }
    ids
}

async fn book_by_first_three(app: &TestApp, authors: &[i64]) -> i64 {
    let publisher = app.create_publisher("Ace").await;
    app.create_book("The Dispossessed", publisher, json!({ "author_ids": &authors[0..3] }))
        .await
}

fn author_params() -> Value {
    payload(
        "authors",
        json!({
            "first_name": "Ursula",
            "last_name": "Le Guin",
            "biography": "Wrote Earthsea.",
            "born_in": "1929-10-21",
            "died_in": "2018-01-22",
        }),
    )
}

// ============================================================================
// GET /authors
// ============================================================================

#[tokio::test]
async fn lists_authors_in_json_api_format() {
    let app = setup_test_app().await;
    seed_authors(&app).await;

    let (status, body) = app.get("/authors").await;
    assert_eq!(status, StatusCode::OK);

    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 10);
    assert_eq!(sorted_keys(&data[0]), ["attributes", "id", "type"]);
    assert_eq!(sorted_keys(&data[0]["attributes"]), AUTHOR_KEYS);
    assert_eq!(data[0]["type"], "authors");
    assert_eq!(body["meta"]["total"], 10);
}

#[tokio::test]
async fn filters_authors_by_search() {
    let app = setup_test_app().await;
    seed_authors(&app).await;

    let (_, body) = app.get("/authors?search=ln-v7").await;
    assert_eq!(last_names(&body), ["ln-v7"]);

    let (_, body) = app.get("/authors?search=LN-V7").await;
    assert_eq!(last_names(&body), ["ln-v7"]);
}

#[tokio::test]
async fn filters_authors_by_book() {
    let app = setup_test_app().await;
    let authors = seed_authors(&app).await;
    let book = book_by_first_three(&app, &authors).await;

    let (_, body) = app.get(&format!("/authors?book_id={book}")).await;
    assert_eq!(last_names(&body), ["ln-v1", "ln-v2", "ln-v3"]);

    let (_, body) = app.get(&format!("/authors?book_id={book}&search=ln-v2")).await;
    assert_eq!(last_names(&body), ["ln-v2"]);
}

#[tokio::test]
async fn paginates_with_configured_limit() {
    let app = setup_test_app_with("pagination:\n  limit: 5\n").await;
    seed_authors(&app).await;

    let (_, body) = app.get("/authors?page=2").await;
    let names = last_names(&body);
    assert_eq!(names.len(), 5);
    assert_eq!(names[0], "ln-v6");
    assert_eq!(body["meta"]["page"], 2);
    assert_eq!(body["meta"]["limit"], 5);
    assert_eq!(body["meta"]["total"], 10);
}

#[tokio::test]
async fn paginates_with_requested_limit() {
    let app = setup_test_app().await;
    seed_authors(&app).await;

    let (_, body) = app.get("/authors?limit=5").await;
    assert_eq!(last_names(&body).len(), 5);

    let (_, body) = app.get("/authors?limit=5&page=2").await;
    assert_eq!(last_names(&body)[0], "ln-v6");
}

#[tokio::test]
async fn rejects_malformed_pagination() {
    let app = setup_test_app().await;

    let (status, _) = app.get("/authors?page=first").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sorts_authors() {
    let app = setup_test_app().await;
    seed_authors(&app).await;

    let cases = [
        ("created_asc", "first_name", "fn-v10"),
        ("created_desc", "first_name", "fn-v1"),
        ("first_name_asc", "first_name", "fn-v9"),
        ("first_name_desc", "first_name", "fn-v1"),
        ("last_name_asc", "last_name", "ln-v9"),
        ("last_name_desc", "last_name", "ln-v1"),
    ];

    for (sort, field, expected_last) in cases {
        let (status, body) = app.get(&format!("/authors?sort={sort}")).await;
        assert_eq!(status, StatusCode::OK);

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.last().unwrap()["attributes"][field], expected_last, "sort={sort}");
    }
}

#[tokio::test]
async fn unknown_sort_falls_back_to_id_order() {
    let app = setup_test_app().await;
    let ids = seed_authors(&app).await;

    let (_, body) = app.get("/authors?sort=shoe_size_asc").await;
    assert_eq!(common::ids(&body), ids);
}

// ============================================================================
// GET /authors/:id
// ============================================================================

#[tokio::test]
async fn shows_an_author() {
    let app = setup_test_app().await;
    let id = app.create_author("Octavia", "Butler").await;

    let (status, body) = app.get(&format!("/authors/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sorted_keys(&body["data"]["attributes"]), AUTHOR_KEYS);
    assert_eq!(body["data"]["attributes"]["last_name"], "Butler");
    assert_eq!(body["data"]["id"], id.to_string());
}

#[tokio::test]
async fn missing_author_is_not_found() {
    let app = setup_test_app().await;

    let (status, body) = app.get("/authors/wat-author").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errors"][0]["status"], "404");

    let (status, _) = app.get("/authors/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// POST /authors
// ============================================================================

#[tokio::test]
async fn creates_an_author() {
    let app = setup_test_app().await;

    let (status, body) = app.post("/authors", author_params()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sorted_keys(&body["data"]["attributes"]), AUTHOR_KEYS);
    assert_eq!(body["data"]["attributes"]["first_name"], "Ursula");
    assert_eq!(body["data"]["attributes"]["born_in"], "1929-10-21");

    let (_, list) = app.get("/authors").await;
    assert_eq!(list["meta"]["total"], 1);
}

#[tokio::test]
async fn create_without_body_is_bad_request() {
    let app = setup_test_app().await;

    let (status, _) = app.send_raw(Method::POST, "/authors", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/authors", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/authors", json!({ "data": null })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_requires_names() {
    let app = setup_test_app().await;

    for field in ["first_name", "last_name"] {
        let mut params = author_params();
        params["data"]["attributes"][field] = Value::Null;

        let (status, body) = app.post("/authors", params).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(errors_on(&body, field), [format!("{field} can't be blank")]);
    }
}

#[tokio::test]
async fn create_rejects_death_before_birth() {
    let app = setup_test_app().await;
    let mut params = author_params();
    params["data"]["attributes"]["died_in"] = json!("1900-01-01");

    let (status, body) = app.post("/authors", params).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!errors_on(&body, "died_in").is_empty());
}

// ============================================================================
// PUT /authors/:id
// ============================================================================

#[tokio::test]
async fn updates_an_author() {
    let app = setup_test_app().await;
    let id = app.create_author("Ursula", "K.").await;

    let (status, body) = app.put(&format!("/authors/{id}"), author_params()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (_, body) = app.get(&format!("/authors/{id}")).await;
    assert_eq!(body["data"]["attributes"]["last_name"], "Le Guin");
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
    let app = setup_test_app().await;
    let id = app.create_author("Ursula", "K.").await;

    let (status, _) = app
        .put(&format!("/authors/{id}"), payload("authors", json!({ "biography": "Anarres" })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.get(&format!("/authors/{id}")).await;
    assert_eq!(body["data"]["attributes"]["first_name"], "Ursula");
    assert_eq!(body["data"]["attributes"]["biography"], "Anarres");
}

#[tokio::test]
async fn update_errors() {
    let app = setup_test_app().await;
    let id = app.create_author("Ursula", "K.").await;
    let url = format!("/authors/{id}");

    let (status, _) = app.put("/authors/wat-author", author_params()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send_raw(Method::PUT, &url, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for field in ["first_name", "last_name"] {
        let mut params = author_params();
        params["data"]["attributes"][field] = Value::Null;
        let (status, _) = app.put(&url, params).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

// ============================================================================
// DELETE /authors/:id
// ============================================================================

#[tokio::test]
async fn deletes_an_author() {
    let app = setup_test_app().await;
    let id = app.create_author("Ursula", "K.").await;

    let (status, _) = app.delete(&format!("/authors/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/authors/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete("/authors/wat_author").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
