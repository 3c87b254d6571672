use super::dto::{MediaResponse, SubmitVideoResponse, VideoIdPath, VideoStatusResponse};
use super::service::MediaService;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;
use crate::workers::encoding_queue::QueueSnapshot;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

/// Upload a video to be encoded to HLS in the background
#[utoipa::path(
    post,
    path = "/api/v1/medias/upload-video-hls",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Video queued for encoding", body = ApiResponse<SubmitVideoResponse>),
        (status = 400, description = "Missing or non-video file"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Account not verified"),
        (status = 413, description = "File too large"),
        (status = 503, description = "Encoding queue full or status store unavailable")
    ),
    tag = "Media",
    security(("bearer_auth" = []))
)]
pub async fn upload_video_hls(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    match MediaService::upload_video_hls(&state, &mut multipart).await {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Upload video HLS successfully"),
            StatusCode::CREATED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Upload a video to be streamed as-is
#[utoipa::path(
    post,
    path = "/api/v1/medias/upload-video",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Video stored", body = ApiResponse<MediaResponse>),
        (status = 400, description = "Missing or non-video file"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Account not verified"),
        (status = 413, description = "File too large")
    ),
    tag = "Media",
    security(("bearer_auth" = []))
)]
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    match MediaService::upload_video(&state, &mut multipart).await {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Upload video successfully"),
            StatusCode::CREATED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Get the encoding status of an uploaded video
#[utoipa::path(
    get,
    path = "/api/v1/medias/video-status/{id}",
    params(
        ("id" = String, Path, description = "Job id returned by upload-video-hls")
    ),
    responses(
        (status = 200, description = "Encoding status", body = ApiResponse<VideoStatusResponse>),
        (status = 400, description = "Malformed id"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown job id")
    ),
    tag = "Media",
    security(("bearer_auth" = []))
)]
pub async fn get_video_status(
    State(state): State<AppState>,
    Path(params): Path<VideoIdPath>,
) -> impl IntoResponse {
    if params.validate().is_err() {
        return ApiError("Invalid video id".to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    match MediaService::get_video_status(&state, &params.id).await {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Get video status successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Inspect the encoding queue
#[utoipa::path(
    get,
    path = "/api/v1/medias/queue",
    responses(
        (status = 200, description = "Queue snapshot", body = ApiResponse<QueueSnapshot>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Media",
    security(("bearer_auth" = []))
)]
pub async fn get_queue(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = MediaService::queue_snapshot(&state).await;
    ApiSuccess(
        ApiResponse::success(snapshot, "Get encoding queue successfully"),
        StatusCode::OK,
    )
}
