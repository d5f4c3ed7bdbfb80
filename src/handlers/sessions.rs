use super::{json_body, ApiResponse};
use crate::error::{Error, Result};
use crate::http_server::AppState;
use crate::types::{SendReceipt, Session};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Session>>)> {
    // The body is optional: an empty request creates a session with a generated id.
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("Invalid request body: {e}")))?
    };

    let session = state.sessions.create_session(request.session_id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(session))))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<ApiResponse<Vec<Session>>> {
    Json(ApiResponse::ok(state.sessions.list_sessions().await))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Session>>> {
    let session = state
        .sessions
        .get_session(&session_id)
        .await
        .ok_or(Error::SessionNotFound)?;
    Ok(Json(ApiResponse::ok(session)))
}

pub async fn logout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    if state.sessions.get_session(&session_id).await.is_none() {
        return Err(Error::SessionNotFound);
    }
    if !state.sessions.logout(&session_id).await {
        return Err(Error::Client("Failed to logout session".into()));
    }
    Ok(Json(ApiResponse::message("Session logged out successfully")))
}

pub async fn destroy_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    if state.sessions.get_session(&session_id).await.is_none() {
        return Err(Error::SessionNotFound);
    }
    if !state.sessions.destroy_session(&session_id).await {
        return Err(Error::Client("Failed to destroy session".into()));
    }
    Ok(Json(ApiResponse::message("Session destroyed successfully")))
}

pub async fn send_text(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: std::result::Result<Json<SendTextRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SendReceipt>>> {
    let request = json_body(body)?;
    let (to, message) = match (request.to, request.message) {
        (Some(to), Some(message)) if !to.trim().is_empty() && !message.is_empty() => (to, message),
        _ => return Err(Error::Validation("Both 'to' and 'message' are required".into())),
    };

    let receipt = state.sessions.send_text(&session_id, &to, &message).await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

pub async fn send_media(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<SendReceipt>>> {
    let mut to: Option<String> = None;
    let mut caption: Option<String> = None;
    let mut upload: Option<PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let extension = field
                    .file_name()
                    .and_then(|n| std::path::Path::new(n).extension())
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{e}"))
                    .unwrap_or_default();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("Failed to read upload: {e}")))?;

                tokio::fs::create_dir_all(&state.upload_dir).await?;
                let path = state.upload_dir.join(format!("{}{extension}", Uuid::new_v4()));
                tokio::fs::write(&path, &bytes).await?;
                upload = Some(path);
            }
            "to" | "caption" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(format!("Invalid field {name}: {e}")))?;
                if name == "to" {
                    to = Some(value);
                } else {
                    caption = Some(value);
                }
            }
            _ => {}
        }
    }

    let Some(path) = upload else {
        return Err(Error::Validation("File is required".into()));
    };

    let result = match to.filter(|t| !t.trim().is_empty()) {
        Some(to) => {
            state
                .sessions
                .send_media(&session_id, &to, &path, caption.as_deref())
                .await
        }
        None => Err(Error::Validation("Recipient 'to' is required".into())),
    };

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!("failed to remove upload {}: {e}", path.display());
    }

    Ok(Json(ApiResponse::ok(result?)))
}
