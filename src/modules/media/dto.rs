use super::model::{EncodingStatus, MediaType, VideoStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitVideoResponse {
    pub job_id: String,
    /// Where the master playlist will be served once encoding succeeds.
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MediaResponse {
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoStatusResponse {
    pub name: String,
    pub status: EncodingStatus,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

impl From<VideoStatus> for VideoStatusResponse {
    fn from(v: VideoStatus) -> Self {
        Self {
            name: v.name,
            status: v.status,
            created_at: v.created_at,
            updated_at: v.updated_at,
        }
    }
}

/// Rejects anything that could escape the directory it is joined onto.
fn validate_path_component(value: &str) -> Result<(), ValidationError> {
    let safe = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if safe {
        Ok(())
    } else {
        Err(ValidationError::new("path_component"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VideoIdPath {
    #[validate(length(max = 64), custom(function = "validate_path_component"))]
    pub id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct HlsFilePath {
    #[validate(length(max = 64), custom(function = "validate_path_component"))]
    pub id: String,
    #[validate(length(max = 16), custom(function = "validate_path_component"))]
    pub variant: String,
    #[validate(length(max = 64), custom(function = "validate_path_component"))]
    pub segment: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VideoFilePath {
    #[validate(length(max = 80), custom(function = "validate_path_component"))]
    pub name: String,
}
