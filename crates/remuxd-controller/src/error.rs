//! Controller API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use remuxd_store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] remuxd_media::MediaError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::DuplicateTask(_))
            | ApiError::Store(StoreError::TaskBusy(_))
            | ApiError::Store(StoreError::IllegalTransition(_)) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Store(_) | ApiError::Media(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remuxd_models::{TaskStatus, TransitionError};

    #[test]
    fn test_store_error_mapping() {
        let not_found = ApiError::Store(StoreError::TaskNotFound("x".into()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let duplicate = ApiError::Store(StoreError::DuplicateTask("/raw/X".into()));
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

        let illegal = ApiError::Store(StoreError::IllegalTransition(TransitionError {
            from: TaskStatus::Pending,
            to: TaskStatus::Completed,
        }));
        assert_eq!(illegal.status_code(), StatusCode::CONFLICT);
    }
}
