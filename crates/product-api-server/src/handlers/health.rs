use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::database::{ConnectionManager, ConnectionState};

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    database: String,
}

/// Ready only while the database connection is live.
pub async fn readiness_check(
    Extension(manager): Extension<Arc<ConnectionManager>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let state = manager.current_state();
    let status = if state == ConnectionState::Connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            database: state.to_string(),
        }),
    )
}
