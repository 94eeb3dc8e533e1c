#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use booky::{config::Config, db::Database, handler::AppState};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

pub const API: &str = "/api/v1/admin";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: TempDir,
}

/// Router over an in-memory database and a throwaway upload store.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with("").await
}

/// Same as [`setup_test_app`] with extra top-level YAML sections.
pub async fn setup_test_app_with(extra_yaml: &str) -> TestApp {
    let store = tempfile::tempdir().expect("temp store");
    let yaml = format!(
        "app:\n  database: test.db\n  port: 0\n  base_url: http://books.test\n{extra_yaml}"
    );
    let mut cfg = Config::from_yaml(&yaml).expect("test config");
    cfg.uploads.store_dir = store.path().to_string_lossy().into_owned();

    let db = Database::in_memory().await.expect("in-memory database");
    let state = AppState::new(db, cfg);
    let router = booky::app(state.clone());

    TestApp { router, state, store }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("response body");

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{API}{path}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(format!("{API}{path}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send_json(Method::POST, path, body).await
    }

    pub async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send_json(Method::PUT, path, body).await
    }

    pub async fn send_json(&self, method: Method, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(format!("{API}{path}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn send_raw(&self, method: Method, path: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(format!("{API}{path}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// `POST /uploads` with text fields and one file part.
    pub async fn upload(&self, fields: &[(&str, &str)], filename: &str, content: &[u8]) -> (StatusCode, Value) {
        self.send_multipart(fields, Some((filename, content))).await
    }

    pub async fn upload_without_file(&self, fields: &[(&str, &str)]) -> (StatusCode, Value) {
        self.send_multipart(fields, None).await
    }

    async fn send_multipart(&self, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> (StatusCode, Value) {
        let boundary = "booky-test-boundary";
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
            );
        }
        if let Some((filename, content)) = file {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        self.post_multipart(boundary, body).await
    }

    /// `POST /uploads` with a body assembled by the caller.
    pub async fn post_multipart(&self, boundary: &str, body: Vec<u8>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{API}/uploads"))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn create(&self, path: &str, kind: &str, attributes: Value) -> i64 {
        let (status, body) = self.post(path, payload(kind, attributes)).await;
        assert_eq!(status, StatusCode::CREATED, "create {path}: {body}");
        id_of(&body["data"])
    }

    pub async fn create_publisher(&self, name: &str) -> i64 {
        self.create("/publishers", "publishers", json!({ "name": name })).await
    }

    pub async fn create_shop(&self, name: &str) -> i64 {
        self.create("/shops", "shops", json!({ "name": name })).await
    }

    pub async fn create_genre(&self, name: &str) -> i64 {
        self.create("/genres", "genres", json!({ "name": name })).await
    }

    pub async fn create_author(&self, first_name: &str, last_name: &str) -> i64 {
        self.create(
            "/authors",
            "authors",
            json!({ "first_name": first_name, "last_name": last_name }),
        )
        .await
    }

    pub async fn create_book(&self, title: &str, publisher_id: i64, extra: Value) -> i64 {
        let mut attributes = json!({
            "title": title,
            "pages_count": 320,
            "published_at": "2001-09-11",
            "publisher_id": publisher_id,
        });
        if let (Some(attrs), Value::Object(extra)) = (attributes.as_object_mut(), extra) {
            attrs.extend(extra);
        }
        self.create("/books", "books", attributes).await
    }

    pub async fn create_user(&self, email: &str, username: &str) -> i64 {
        self.create("/users", "users", json!({ "email": email, "username": username }))
            .await
    }
}

pub fn payload(kind: &str, attributes: Value) -> Value {
    json!({ "data": { "type": kind, "attributes": attributes } })
}

pub fn id_of(resource: &Value) -> i64 {
    resource["id"].as_str().and_then(|s| s.parse().ok()).expect("resource id")
}

pub fn ids(body: &Value) -> Vec<i64> {
    body["data"].as_array().expect("collection").iter().map(id_of).collect()
}

/// `detail` of every error entry pointing at `/data/attributes/<field>`.
pub fn errors_on(body: &Value, field: &str) -> Vec<String> {
    let pointer = format!("/data/attributes/{field}");
    body["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter(|e| e["source"]["pointer"] == pointer.as_str())
                .filter_map(|e| e["detail"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
