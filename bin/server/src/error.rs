//! Error responses for the operational HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

/// Errors returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The requested resource does not exist.
    NotFound { what: &'static str, id: String },
    /// The request payload was rejected.
    BadRequest { message: String },
    /// An internal component failed.
    Internal { message: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what, id } => write!(f, "{what} '{id}' not found"),
            Self::BadRequest { message } => write!(f, "bad request: {message}"),
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::BadRequest { message } => (StatusCode::BAD_REQUEST, message.clone()),
            // Internal details go to the log, not the client.
            Self::Internal { message } => {
                tracing::error!(error = message.as_str(), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<amber_relay_automation::StoreError> for ApiError {
    fn from(e: amber_relay_automation::StoreError) -> Self {
        Self::Internal {
            message: e.to_string(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal {
            message: e.to_string(),
        }
    }
}
