//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ip_relay_common::api::{self, ErrorResponse};

/// Errors returned to API clients.
///
/// The status code is the only machine-readable discriminator; the body is
/// always `{"error": <message>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    MissingInput(&'static str),

    #[error("{}", api::INVALID_TOKEN_OR_INTERNAL)]
    Unauthorized,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{}", api::SERVER_ERROR)]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
