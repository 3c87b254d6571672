use super::dto::{HlsFilePath, VideoFilePath, VideoIdPath};
use super::model::EncodingStatus;
use crate::common::response::ApiError;
use crate::modules::media::error::MediaError;
use crate::state::AppState;
use crate::workers::transcoder::MASTER_PLAYLIST;
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::Path as FsPath;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use validator::Validate;

const HLS_PLAYLIST_MIME: &str = "application/vnd.apple.mpegurl";
const HLS_SEGMENT_MIME: &str = "video/mp2t";

fn not_found() -> Response {
    ApiError("Not Found".to_string(), StatusCode::NOT_FOUND).into_response()
}

/// Serves `path` through `ServeFile`, which answers Range and conditional
/// requests and 404s on a missing file.
async fn serve_file(path: &FsPath, req: Request) -> Response {
    let hls_mime = match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => HLS_PLAYLIST_MIME.parse::<mime::Mime>().ok(),
        Some("ts") => HLS_SEGMENT_MIME.parse::<mime::Mime>().ok(),
        _ => None,
    };
    let service = match hls_mime {
        Some(m) => ServeFile::new_with_mime(path, &m),
        None => ServeFile::new(path),
    };

    match service.oneshot(req).await {
        Ok(res) => res.map(Body::new),
        Err(never) => match never {},
    }
}

/// HLS output is only published once its job reached Success.
async fn ensure_encoded(state: &AppState, id: &str) -> Result<(), Response> {
    match state.status.find(id).await {
        Ok(Some(record)) if record.status == EncodingStatus::Success => Ok(()),
        Ok(_) => Err(not_found()),
        Err(e) => Err(ApiError::from(MediaError::from(e)).into_response()),
    }
}

pub async fn serve_master_playlist(
    State(state): State<AppState>,
    Path(params): Path<VideoIdPath>,
    req: Request,
) -> Response {
    if params.validate().is_err() {
        return not_found();
    }
    if let Err(res) = ensure_encoded(&state, &params.id).await {
        return res;
    }

    let path = state.config.media.hls_dir.join(&params.id).join(MASTER_PLAYLIST);
    serve_file(&path, req).await
}

pub async fn serve_hls_file(
    State(state): State<AppState>,
    Path(params): Path<HlsFilePath>,
    req: Request,
) -> Response {
    if params.validate().is_err() {
        return not_found();
    }
    if let Err(res) = ensure_encoded(&state, &params.id).await {
        return res;
    }

    let path = state
        .config
        .media
        .hls_dir
        .join(&params.id)
        .join(&params.variant)
        .join(&params.segment);
    serve_file(&path, req).await
}

pub async fn serve_video_stream(
    State(state): State<AppState>,
    Path(params): Path<VideoFilePath>,
    req: Request,
) -> Response {
    if params.validate().is_err() {
        return not_found();
    }

    let path = state.config.media.video_dir.join(&params.name);
    serve_file(&path, req).await
}
