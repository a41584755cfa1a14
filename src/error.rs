use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::alarm::AlarmError;
use crate::bills::BillError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("database error: {0}")]
    Backend(String),
}

/// Coarse classification of a failed remote write, surfaced to the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncErrorKind {
    PermissionDenied,
    NotFound,
    Conflict,
    Backend,
}

impl StoreError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            StoreError::PermissionDenied(_) => SyncErrorKind::PermissionDenied,
            StoreError::NotFound(_) => SyncErrorKind::NotFound,
            StoreError::Conflict(_) => SyncErrorKind::Conflict,
            StoreError::Serialization(_) | StoreError::Backend(_) => SyncErrorKind::Backend,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match *err.kind {
            // 13 is Unauthorized
            ErrorKind::Command(ref command) if command.code == 13 => {
                StoreError::PermissionDenied(err.to_string())
            }
            ErrorKind::Authentication { .. } => StoreError::PermissionDenied(err.to_string()),
            // 11000 is a duplicate key
            ErrorKind::Write(WriteFailure::WriteError(ref write)) if write.code == 11000 => {
                StoreError::Conflict(err.to_string())
            }
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                StoreError::Serialization(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid authorization")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("payload of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bill(#[from] BillError),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Bill(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Alarm(_) => StatusCode::CONFLICT,
            ApiError::Store(err) => match err.kind() {
                SyncErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                SyncErrorKind::NotFound => StatusCode::NOT_FOUND,
                SyncErrorKind::Conflict => StatusCode::CONFLICT,
                SyncErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let denied = ApiError::from(StoreError::PermissionDenied("bills/b1".into()));
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

        let backend = ApiError::from(StoreError::Backend("timeout".into()));
        assert_eq!(backend.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn serialization_failures_are_backend_kind() {
        assert_eq!(
            StoreError::Serialization("bad".into()).kind(),
            SyncErrorKind::Backend
        );
    }
}
