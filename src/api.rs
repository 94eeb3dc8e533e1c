//! JSON-API request and response shapes.

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config;
use crate::error::{AppError, AppResult, ValidationErrors};

/// Implemented by every record rendered as a JSON-API resource object.
/// The record's own `Serialize` impl produces the `attributes` member, so
/// implementors mark their id (and relationship keys) `skip_serializing`.
pub trait JsonApiResource: Serialize {
    const TYPE: &'static str;

    fn id(&self) -> i64;

    fn relationships(&self) -> Option<Value> {
        None
    }
}

#[derive(Debug, Serialize)]
pub struct ResourceObject<'a, T: Serialize> {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Value>,
}

impl<'a, T: JsonApiResource> From<&'a T> for ResourceObject<'a, T> {
    fn from(record: &'a T) -> Self {
        ResourceObject {
            id: record.id().to_string(),
            kind: T::TYPE,
            attributes: record,
            relationships: record.relationships(),
        }
    }
}

/// Reference used inside `relationships`.
pub fn identifier(kind: &str, id: i64) -> Value {
    serde_json::json!({ "type": kind, "id": id.to_string() })
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct Document<D> {
    pub data: D,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

pub fn success<T: JsonApiResource>(record: &T) -> Response {
    let doc = Document {
        data: ResourceObject::from(record),
        meta: None,
    };
    (StatusCode::OK, Json(doc)).into_response()
}

pub fn created<T: JsonApiResource>(record: &T) -> Response {
    let doc = Document {
        data: ResourceObject::from(record),
        meta: None,
    };
    (StatusCode::CREATED, Json(doc)).into_response()
}

pub fn collection<T: JsonApiResource>(records: &[T], page: &Page, total: i64) -> Response {
    let doc = Document {
        data: records.iter().map(ResourceObject::from).collect::<Vec<_>>(),
        meta: Some(Meta {
            page: page.page,
            limit: page.limit,
            total,
        }),
    };
    (StatusCode::OK, Json(doc)).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Path ids arrive as strings so that `/authors/wat-author` is a 404, not a
/// 400 from the path extractor.
pub fn parse_id(raw: &str, resource: &str) -> AppResult<i64> {
    raw.parse::<i64>().map_err(|_| AppError::not_found(resource))
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub search: Option<String>,
    pub book_id: Option<String>,
    pub author_id: Option<String>,
    pub publisher_id: Option<String>,
    pub genre_id: Option<String>,
    pub shop_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
    pub offset: u32,
}

fn parse_positive(name: &str, raw: &Option<String>) -> AppResult<Option<u32>> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<u32>()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("`{name}` must be a positive integer"))),
    }
}

impl QueryParams {
    pub fn page(&self, cfg: &config::Pagination) -> AppResult<Page> {
        let page = parse_positive("page", &self.page)?.unwrap_or(1).max(1);
        let limit = parse_positive("limit", &self.limit)?
            .unwrap_or(cfg.limit)
            .clamp(1, cfg.max_limit.max(1));

        Ok(Page {
            page,
            limit,
            offset: (page - 1).saturating_mul(limit),
        })
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Parses one of the `*_id` filters; a malformed id is a client error.
    pub fn id_filter(&self, name: &str) -> AppResult<Option<i64>> {
        let raw = match name {
            "book_id" => &self.book_id,
            "author_id" => &self.author_id,
            "publisher_id" => &self.publisher_id,
            "genre_id" => &self.genre_id,
            "shop_id" => &self.shop_id,
            _ => return Ok(None),
        };

        match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(s) => s
                .parse::<i64>()
                .map(Some)
                .map_err(|_| AppError::BadRequest(format!("`{name}` must be an integer"))),
        }
    }
}

// ============================================================================
// Request payloads
// ============================================================================

/// The `data.attributes` member of a `{ data: { type, attributes } }` body.
/// Anything short of that shape is rejected with 400.
#[derive(Debug, Clone, Default)]
pub struct Attributes(Map<String, Value>);

#[axum::async_trait]
impl<S> FromRequest<S> for Attributes
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        Attributes::from_body(&bytes)
    }
}

impl Attributes {
    pub fn from_body(bytes: &[u8]) -> AppResult<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::BadRequest("request body is missing".to_string()));
        }

        let body: Value = serde_json::from_slice(bytes)
            .map_err(|e| AppError::BadRequest(format!("request body is not valid json: {e}")))?;

        let data = body
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| AppError::BadRequest("param is missing or the value is empty: data".to_string()))?;

        match data.get("attributes") {
            Some(Value::Object(attrs)) if !attrs.is_empty() => Ok(Attributes(attrs.clone())),
            _ => Err(AppError::BadRequest(
                "param is missing or the value is empty: attributes".to_string(),
            )),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Attributes(map)
    }

    /// `None` when absent, `Some(None)` when explicitly null.
    pub fn string(&self, key: &str, errors: &mut ValidationErrors) -> Option<Option<String>> {
        match self.0.get(key)? {
            Value::Null => Some(None),
            Value::String(s) => Some(Some(s.clone())),
            Value::Number(n) => Some(Some(n.to_string())),
            Value::Bool(b) => Some(Some(b.to_string())),
            _ => {
                errors.add(key, "is invalid");
                None
            }
        }
    }

    pub fn integer(&self, key: &str, errors: &mut ValidationErrors) -> Option<Option<i64>> {
        let parsed = match self.0.get(key)? {
            Value::Null => return Some(None),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(i),
                None => Err("must be an integer"),
            },
            Value::String(s) if s.trim().is_empty() => return Some(None),
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(i),
                Err(_) if s.trim().parse::<f64>().is_ok() => Err("must be an integer"),
                Err(_) => Err("is not a number"),
            },
            _ => Err("is not a number"),
        };

        match parsed {
            Ok(i) => Some(Some(i)),
            Err(msg) => {
                errors.add(key, msg);
                None
            }
        }
    }

    pub fn number(&self, key: &str, errors: &mut ValidationErrors) -> Option<Option<f64>> {
        let parsed = match self.0.get(key)? {
            Value::Null => return Some(None),
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return Some(None),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        };

        if parsed.is_none() {
            errors.add(key, "is not a number");
            return None;
        }
        Some(parsed)
    }

    /// Dates are normalised to `YYYY-MM-DD`.
    pub fn date(&self, key: &str, errors: &mut ValidationErrors) -> Option<Option<String>> {
        let raw = self.string(key, errors)?;
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            return Some(None);
        };

        match parse_date(&raw) {
            Some(date) => Some(Some(date.format("%Y-%m-%d").to_string())),
            None => {
                errors.add(key, "is not a valid date");
                None
            }
        }
    }

    pub fn boolean(&self, key: &str, errors: &mut ValidationErrors) -> Option<bool> {
        match self.0.get(key)? {
            Value::Null => Some(false),
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" | "" => Some(false),
                _ => {
                    errors.add(key, "is not a boolean");
                    None
                }
            },
            Value::Number(n) => Some(n.as_i64() == Some(1)),
            _ => {
                errors.add(key, "is not a boolean");
                None
            }
        }
    }

    /// Lists of record ids, e.g. `author_ids`.
    pub fn ids(&self, key: &str, errors: &mut ValidationErrors) -> Option<Vec<i64>> {
        let Value::Array(items) = self.0.get(key)? else {
            if self.0.get(key).is_some_and(Value::is_null) {
                return Some(vec![]);
            }
            errors.add(key, "must be a list of ids");
            return None;
        };

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = match item {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match id {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => {
                    errors.add(key, "must be a list of ids");
                    return None;
                }
            }
        }
        Some(ids)
    }
}

/// Accepts a bare date or an RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.date_naive())
    })
}

pub fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Adds "can't be blank" unless the field already failed type coercion.
pub fn require_present(errors: &mut ValidationErrors, field: &str, present: bool) {
    if !present && !errors.has(field) {
        errors.add(field, "can't be blank");
    }
}
