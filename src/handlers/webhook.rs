use super::{json_body, ApiResponse};
use crate::error::{Error, Result};
use crate::http_server::AppState;
use crate::settings::is_valid_url;
use crate::types::{DeliveryLogEntry, DeliveryResult};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn get_settings(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let urls = state.settings.urls().await;
    Json(ApiResponse::ok(json!({ "webhookUrls": urls })))
}

pub async fn update_settings(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<ApiResponse<Value>>> {
    let body = json_body(body)?;
    let entries = body
        .get("webhookUrls")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Validation("webhookUrls must be an array".into()))?;

    let urls = entries
        .iter()
        .map(|v| v.as_str().map(str::to_owned))
        .collect::<Option<Vec<String>>>()
        .ok_or_else(|| Error::Validation("All webhook URLs must be valid URLs".into()))?;

    let urls = state.settings.replace(urls).await?;
    Ok(Json(
        ApiResponse::ok(json!({ "webhookUrls": urls }))
            .with_message("Webhook settings updated successfully"),
    ))
}

pub async fn test_webhook(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<ApiResponse<DeliveryResult>>> {
    let body = json_body(body)?;
    let url = body
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::Validation("URL is required".into()))?;

    if !is_valid_url(url) {
        return Err(Error::Validation("Invalid URL format".into()));
    }

    let result = state.dispatcher.test_delivery(url).await;
    Ok(Json(ApiResponse::ok(result)))
}

pub async fn get_logs(State(state): State<AppState>) -> Json<ApiResponse<Vec<DeliveryLogEntry>>> {
    Json(ApiResponse::ok(state.dispatcher.recent_deliveries()))
}

pub async fn clear_logs(State(state): State<AppState>) -> Json<ApiResponse<()>> {
    state.dispatcher.clear_deliveries();
    Json(ApiResponse::message("Webhook delivery logs cleared"))
}
