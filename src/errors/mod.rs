use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),
    /// Market data fetch failed; persisted state is left untouched.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Notification sink rejected or never received the message.
    #[error("delivery error: {0}")]
    Delivery(String),
    #[error("storage error: {0}")]
    Storage(String),
    /// Another invocation holds the single-writer lock.
    #[error("locked: {0}")]
    Locked(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Upstream(message) | AppError::Delivery(message) => {
                (StatusCode::BAD_GATEWAY, message.clone())
            }
            AppError::Locked(message) => (StatusCode::CONFLICT, message.clone()),
            AppError::Storage(message) | AppError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            }
        };

        let body = Json(ErrorResponse { message });
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Storage(error.to_string())
    }
}

/// A candle record that cannot enter the store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("malformed candle record: {0}")]
    Malformed(String),
    #[error("candle {timestamp} has a non-finite value")]
    NonFinite { timestamp: u64 },
    #[error("candle {timestamp} has a non-positive low ({low})")]
    NonPositivePrice { timestamp: u64, low: f64 },
    #[error(
        "candle {timestamp} violates OHLC bounds (o={open}, h={high}, l={low}, c={close})"
    )]
    OhlcViolation {
        timestamp: u64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}
