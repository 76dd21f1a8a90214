use axum::{extract::State, routing::get, Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::{AppError, ApiResult},
    state::{AppState, RequestId},
};

const SERVICES: &[&str] = &["send-alarm", "force-logout", "subscriptions", "stats"];

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
    services: &'static [&'static str],
}

#[derive(Serialize)]
struct StatsResponse {
    subscriptions: u64,
    users: u64,
    timestamp: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        services: SERVICES,
    })
}

async fn stats(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Json<StatsResponse>> {
    let stats = state
        .store
        .stats()
        .await
        .map_err(|err| AppError::from(err).with_request_id(request_id.as_str()))?;

    Ok(Json(StatsResponse {
        subscriptions: stats.subscriptions,
        users: stats.users,
        timestamp: Utc::now(),
    }))
}
