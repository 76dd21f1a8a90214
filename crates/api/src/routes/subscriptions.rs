use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_core::{SubscriptionDescriptor, SubscriptionRecord};

use crate::{
    error::{AppError, ApiResult},
    state::{AppState, RequestId},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/subscriptions", post(save_subscription))
        .route("/subscriptions/{user_id}", delete(remove_subscription))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSubscriptionRequest {
    user_id: Option<String>,
    subscription: Option<SubscriptionDescriptor>,
    role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSubscriptionResponse {
    success: bool,
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveSubscriptionResponse {
    success: bool,
    removed: u64,
}

pub async fn save_subscription(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(payload): Json<SaveSubscriptionRequest>,
) -> ApiResult<Json<SaveSubscriptionResponse>> {
    let bad_request =
        |msg: &str| AppError::BadRequest(msg.to_string()).with_request_id(request_id.as_str());

    let user_id = payload
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("userId is required"))?;
    let descriptor = payload
        .subscription
        .ok_or_else(|| bad_request("subscription is required"))?;
    if !descriptor.is_valid() {
        return Err(bad_request(
            "subscription needs an https endpoint and both p256dh and auth keys",
        ));
    }

    let role = payload
        .role
        .as_deref()
        .map(str::trim)
        .filter(|role| !role.is_empty());
    let record = SubscriptionRecord::nested(&user_id, role, &descriptor, Utc::now());
    state
        .store
        .save(&record)
        .await
        .map_err(|err| AppError::from(err).with_request_id(request_id.as_str()))?;

    info!(request_id = request_id.as_str(), %user_id, "push subscription saved");

    Ok(Json(SaveSubscriptionResponse {
        success: true,
        id: record.id,
    }))
}

pub async fn remove_subscription(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<RemoveSubscriptionResponse>> {
    let removed = state
        .store
        .delete_by_user(&user_id)
        .await
        .map_err(|err| AppError::from(err).with_request_id(request_id.as_str()))?;

    info!(request_id = request_id.as_str(), %user_id, removed, "push subscription removed");

    Ok(Json(RemoveSubscriptionResponse {
        success: true,
        removed,
    }))
}
