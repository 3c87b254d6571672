use super::repository::StoreError;
use crate::common::response::ApiError;
use crate::common::upload::UploadError;
use crate::workers::encoding_queue::QueueFull;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0}")]
    InvalidUpload(String),
    #[error("File exceeds the maximum size of {0} bytes")]
    PayloadTooLarge(u64),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Encoding queue is full ({} waiting), try again later", .0.capacity)]
    QueueFull(#[from] QueueFull),
    #[error("Status store unavailable")]
    StoreUnavailable(String),
    #[error("Internal Server Error")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MediaError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            MediaError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            MediaError::NotFound(_) => StatusCode::NOT_FOUND,
            MediaError::Conflict(_) => StatusCode::CONFLICT,
            MediaError::QueueFull(_) | MediaError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            MediaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UploadError> for MediaError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::TooLarge { limit } => MediaError::PayloadTooLarge(limit),
            UploadError::Io(io) => MediaError::Io(io),
            other => MediaError::InvalidUpload(other.to_string()),
        }
    }
}

impl From<StoreError> for MediaError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(name) => MediaError::NotFound(format!("Video '{}' not found", name)),
            StoreError::Duplicate(_) | StoreError::InvalidTransition { .. } => {
                MediaError::Conflict(e.to_string())
            }
            StoreError::Unavailable(cause) => MediaError::StoreUnavailable(cause),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        match &e {
            MediaError::Io(io) => tracing::error!("Media I/O error: {}", io),
            MediaError::StoreUnavailable(cause) => tracing::error!("Status store error: {}", cause),
            _ => {}
        }
        ApiError(e.to_string(), e.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_map_to_client_statuses() {
        let too_large: MediaError = UploadError::TooLarge { limit: 10 }.into();
        assert_eq!(too_large.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let wrong_type: MediaError = UploadError::InvalidContentType("image/png".into()).into();
        assert_eq!(wrong_type.status_code(), StatusCode::BAD_REQUEST);

        let missing: MediaError = UploadError::MissingField("video").into();
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_errors_map_to_server_or_conflict() {
        let down: MediaError = StoreError::Unavailable("pool timed out".into()).into();
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        // The cause stays in the logs.
        assert_eq!(down.to_string(), "Status store unavailable");

        let dup: MediaError = StoreError::Duplicate("abc".into()).into();
        assert_eq!(dup.status_code(), StatusCode::CONFLICT);

        let full: MediaError = QueueFull { capacity: 2 }.into();
        assert_eq!(full.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
