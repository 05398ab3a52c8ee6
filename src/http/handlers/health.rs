//! Liveness and metrics handlers.

use axum::{Json, extract::State};
use serde::Serialize;

use super::super::{AppError, SharedState};
use crate::database::{self, PoolStatus};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<PoolStatus>,
}

/// GET /health - Liveness plus database pool state.
///
/// Always 200: an unreachable database degrades the status but the object
/// endpoints keep working without it.
pub(crate) async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let database = match &state.db {
        Some(pool) => Some(database::status(pool).await),
        None => None,
    };
    let status = match &database {
        Some(db) if !db.reachable => "degraded",
        _ => "ok",
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

/// GET /metrics - Prometheus text exposition.
pub(crate) async fn metrics(State(state): State<SharedState>) -> Result<String, AppError> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or_else(|| AppError::NotFound("Metrics are disabled".to_string()))
}
