//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use reel_media::MediaError;
use reel_models::ValidationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("{context} failed: {source}")]
    Media {
        context: &'static str,
        #[source]
        source: MediaError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap an executor failure with the operation it happened in.
    pub fn media(context: &'static str, source: MediaError) -> Self {
        match source {
            MediaError::Validation(e) => Self::Validation(e),
            source => Self::Media { context, source },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Media { source, .. } if source.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Media { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::RateLimited => "rate_limited",
            ApiError::Media { source, .. } if source.is_validation() => "validation_error",
            ApiError::Media { .. } => "engine_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Media { context, source } => {
                format!("{context} failed: {}", source.user_message())
            }
            other => other.to_string(),
        }
    }

    /// Wording of a 500 without engine or filesystem details.
    fn masked_message(&self) -> String {
        match self {
            ApiError::Media { context, .. } => format!("{context} failed"),
            _ => "An internal error occurred".to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(e.body_text())
        } else {
            ApiError::BadRequest(e.body_text())
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// JSON error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.message();

        let mut response = (
            status,
            Json(ErrorBody {
                error: message.clone(),
                code,
            }),
        )
            .into_response();

        // Masked wording rides along; `mask_internal_errors` swaps it in for production
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code, "{}", message);
            response.extensions_mut().insert(ErrorBody {
                error: self.masked_message(),
                code,
            });
        }

        response
    }
}
