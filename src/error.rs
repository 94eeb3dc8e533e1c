use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Field-level validation messages, keyed by attribute name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn on(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: &str) -> bool {
        !self.on(field).is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(field, messages)| messages.iter().map(move |m| (field.as_str(), m.as_str())))
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.iter().map(|(field, msg)| format!("{field} {msg}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(format!("{resource} not found"))
    }
}

impl From<libsql::Error> for AppError {
    fn from(error: libsql::Error) -> Self {
        AppError::Internal(error.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(error.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorSource {
    pointer: String,
}

#[derive(Debug, Serialize)]
struct ErrorObject {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ErrorSource>,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ErrorDocument {
    errors: Vec<ErrorObject>,
}

fn single_error(status: StatusCode, detail: String) -> Response {
    let body = ErrorDocument {
        errors: vec![ErrorObject {
            status: status.as_u16().to_string(),
            title: status.canonical_reason().map(str::to_string),
            source: None,
            detail,
        }],
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(detail) => single_error(StatusCode::BAD_REQUEST, detail),
            AppError::NotFound(detail) => single_error(StatusCode::NOT_FOUND, detail),
            AppError::Validation(errors) => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                let body = ErrorDocument {
                    errors: errors
                        .iter()
                        .map(|(field, message)| ErrorObject {
                            status: status.as_u16().to_string(),
                            title: None,
                            source: Some(ErrorSource {
                                pointer: format!("/data/attributes/{field}"),
                            }),
                            detail: format!("{field} {message}"),
                        })
                        .collect(),
                };
                (status, Json(body)).into_response()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %crate::unpack_error(err.as_ref()), "request failed");
                single_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
