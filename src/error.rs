use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Session {0} already exists")]
    SessionExists(String),

    #[error("Maximum number of sessions ({0}) reached")]
    CapacityExceeded(usize),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session not ready")]
    SessionNotReady,

    /// Rejected request input. The message is returned to the caller as-is.
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Failed to update configuration file")]
    ConfigWrite(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by the automation client or its gateway.
    #[error("Client error: {0}")]
    Client(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::SessionNotFound => StatusCode::NOT_FOUND,
            Error::SessionExists(_) | Error::SessionNotReady => StatusCode::CONFLICT,
            Error::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
