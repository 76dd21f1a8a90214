use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use vigil_core::types::DispatchFailure;
use vigil_core::{DeliveryTag, DispatchRequest, DispatchResult, DispatchScope, PushMessage};

use crate::{
    error::{AppError, ApiResult},
    state::{AppState, RequestId},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/send-alarm", post(send_alarm))
        .route("/force-logout", post(force_logout))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAlarmRequest {
    #[serde(alias = "target")]
    scope: Option<String>,
    user_ids: Option<Vec<String>>,
    role: Option<String>,
    #[serde(rename = "type")]
    kind: Option<DeliveryTag>,
    title: Option<String>,
    body: Option<String>,
    object_id: Option<String>,
    object_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceLogoutRequest {
    user_id: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    success: bool,
    sent_count: usize,
    error_count: usize,
    errors: Vec<DispatchErrorItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchErrorItem {
    subscription_id: String,
    error: String,
}

impl From<DispatchResult> for DispatchResponse {
    fn from(result: DispatchResult) -> Self {
        let errors = result
            .failures
            .iter()
            .map(|DispatchFailure { record_id, reason }| DispatchErrorItem {
                subscription_id: record_id.clone(),
                error: reason.to_string(),
            })
            .collect();
        Self {
            success: true,
            sent_count: result.success_count,
            error_count: result.error_count(),
            errors,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_scope(payload: &SendAlarmRequest) -> Result<DispatchScope, AppError> {
    let scope = payload
        .scope
        .as_deref()
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .ok_or_else(|| AppError::BadRequest("scope is required".to_string()))?;

    match scope {
        "all" => Ok(DispatchScope::All),
        "users" => {
            let user_ids: Vec<String> = payload
                .user_ids
                .iter()
                .flatten()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if user_ids.is_empty() {
                return Err(AppError::BadRequest(
                    "userIds must list at least one user".to_string(),
                ));
            }
            Ok(DispatchScope::Users(user_ids))
        }
        "role" => non_blank(payload.role.clone())
            .map(DispatchScope::Role)
            .ok_or_else(|| AppError::BadRequest("role is required for role scope".to_string())),
        other => Err(AppError::BadRequest(format!("unknown scope: {}", other))),
    }
}

pub async fn send_alarm(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(payload): Json<SendAlarmRequest>,
) -> ApiResult<Json<DispatchResponse>> {
    let scope = parse_scope(&payload).map_err(|err| err.with_request_id(request_id.as_str()))?;

    let mut message = PushMessage::new(payload.kind.unwrap_or(DeliveryTag::Alarm));
    message.title = non_blank(payload.title);
    message.body = non_blank(payload.body);
    message.object_id = non_blank(payload.object_id);
    message.object_name = non_blank(payload.object_name);

    let request = DispatchRequest::new(scope, message);
    let result = state
        .dispatcher
        .dispatch(&request, Utc::now())
        .await
        .map_err(|err| AppError::from(err).with_request_id(request_id.as_str()))?;

    info!(
        request_id = request_id.as_str(),
        target = %request.target_key(),
        sent = result.success_count,
        failed = result.error_count(),
        "alarm dispatched"
    );

    Ok(Json(result.into()))
}

pub async fn force_logout(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(payload): Json<ForceLogoutRequest>,
) -> ApiResult<Json<DispatchResponse>> {
    let (user_id, body) = match (non_blank(payload.user_id), non_blank(payload.message)) {
        (Some(user_id), Some(body)) => (user_id, body),
        _ => {
            return Err(AppError::BadRequest("userId and message are required".to_string())
                .with_request_id(request_id.as_str()))
        }
    };

    let mut message = PushMessage::new(DeliveryTag::ForceLogout);
    message.body = Some(body);
    message.user_id = Some(user_id.clone());

    // a deleted account still has to receive its logout notice
    let request = DispatchRequest::new(DispatchScope::Users(vec![user_id.clone()]), message)
        .with_target(format!("force_logout:{}", user_id))
        .including_inactive();
    let result = state
        .dispatcher
        .dispatch(&request, Utc::now())
        .await
        .map_err(|err| AppError::from(err).with_request_id(request_id.as_str()))?;

    info!(
        request_id = request_id.as_str(),
        %user_id,
        sent = result.success_count,
        failed = result.error_count(),
        "force logout dispatched"
    );

    Ok(Json(result.into()))
}
