use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mkdedit_core::storage::FileStoreError;
use tracing::{error, warn};

/// Failed request: a status code plus a short plain-text reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("file not found: {name}"),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<FileStoreError> for ApiError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::InvalidInput { reason } => Self::bad_request(reason),
            FileStoreError::NotFound { name } => Self::not_found(&name),
            FileStoreError::Storage { reason } => {
                error!(%reason, "store operation failed");
                Self::internal("storage failure")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!(status = %self.status, message = %self.message, "rejected vfs request");
        }
        (self.status, self.message).into_response()
    }
}
