use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "encoding_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncodingStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl EncodingStatus {
    /// Pending -> Processing -> Success | Failed. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: EncodingStatus) -> bool {
        matches!(
            (self, next),
            (EncodingStatus::Pending, EncodingStatus::Processing)
                | (EncodingStatus::Processing, EncodingStatus::Success)
                | (EncodingStatus::Processing, EncodingStatus::Failed)
        )
    }
}

impl fmt::Display for EncodingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EncodingStatus::Pending => "Pending",
            EncodingStatus::Processing => "Processing",
            EncodingStatus::Success => "Success",
            EncodingStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq, ToSchema)]
pub struct VideoStatus {
    pub name: String,
    pub status: EncodingStatus,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Hls,
}
