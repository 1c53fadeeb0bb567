use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use portal_types::api::ActionResponse;

use crate::uploads::UploadError;

/// Every handler failure. The `Display` text is what the caller sees, so
/// storage and I/O variants deliberately print a generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Database error")]
    Storage(anyhow::Error),

    #[error("Failed to save file")]
    FileSave(std::io::Error),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::FileSave(_) | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Save(io) => Self::FileSave(io),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Storage(e) => error!("Storage error: {:#}", e),
            Self::FileSave(e) => error!("File save error: {}", e),
            _ => {}
        }

        (self.status(), Json(ActionResponse::failure(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_details_are_not_leaked() {
        let err = ApiError::Storage(anyhow::anyhow!("no such table: messages"));
        assert_eq!(err.to_string(), "Database error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upload_errors_map_to_validation_or_save() {
        let too_large: ApiError = UploadError::TooLarge { max_mb: 10 }.into();
        assert_eq!(too_large.status(), StatusCode::BAD_REQUEST);
        assert_eq!(too_large.to_string(), "File too large (max 10MB)");

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let save: ApiError = UploadError::Save(io).into();
        assert_eq!(save.to_string(), "Failed to save file");
        assert_eq!(save.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
