use std::sync::Arc;

use axum::{Json, response::IntoResponse};
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::uploads::Storage;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub cfg: Arc<Config>,
    pub storage: Arc<Storage>,
}

impl AppState {
    pub fn new(db: Database, cfg: Config) -> Self {
        let storage = Storage::new(&cfg.uploads.store_dir);
        AppState {
            db: Arc::new(db),
            cfg: Arc::new(cfg),
            storage: Arc::new(storage),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub version: &'static str,
    pub revision: &'static str,
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    data: ApiInfo,
}

pub fn api_info_data() -> ApiInfo {
    ApiInfo {
        version: env!("CARGO_PKG_VERSION"),
        revision: option_env!("BOOKY_REVISION").unwrap_or("unknown"),
    }
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /api`: version and build revision of the running service.
pub async fn api_info() -> impl IntoResponse {
    Json(InfoResponse { data: api_info_data() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_package_version() {
        let info = api_info_data();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(!info.revision.is_empty());
    }
}
