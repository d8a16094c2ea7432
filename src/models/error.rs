use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::models::response::ApiResponse;

/// Error kinds surfaced by the notification pipeline and the HTTP surface.
///
/// Every low-level failure (decode, I/O, render, transport) is mapped into one
/// of these before it leaves the pipeline. The payload is a human-readable
/// message naming the failed stage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    InternalServerError(String),

    /// The mail went out but a follow-up step failed. Running the
    /// operation again would deliver a second copy.
    #[error("{0}")]
    DeliveredWithErrors(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),
}

impl NotificationError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        NotificationError::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        NotificationError::InternalServerError(message.into())
    }

    pub fn delivered_with_errors(message: impl Into<String>) -> Self {
        NotificationError::DeliveredWithErrors(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationError::BadRequest(_) => "bad_request",
            NotificationError::InternalServerError(_) => "internal_server_error",
            NotificationError::DeliveredWithErrors(_) => "delivered_with_errors",
            NotificationError::Unauthorized(_) => "unauthorized",
            NotificationError::Forbidden(_) => "forbidden",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            NotificationError::BadRequest(message)
            | NotificationError::InternalServerError(message)
            | NotificationError::DeliveredWithErrors(message)
            | NotificationError::Unauthorized(message)
            | NotificationError::Forbidden(message) => message,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            NotificationError::BadRequest(_) => StatusCode::BAD_REQUEST,
            NotificationError::InternalServerError(_)
            | NotificationError::DeliveredWithErrors(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NotificationError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            NotificationError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Whether redelivering the same input could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotificationError::InternalServerError(_))
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body: ApiResponse<()> =
            ApiResponse::error(self.kind().to_string(), self.message().to_string());

        (status, Json(body)).into_response()
    }
}
