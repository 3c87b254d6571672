use super::dto::{MediaResponse, SubmitVideoResponse, VideoStatusResponse};
use super::error::MediaError;
use super::model::MediaType;
use crate::common::upload::{StoredFile, receive_video};
use crate::state::AppState;
use crate::workers::encoding_queue::{EncodingJob, QueueSnapshot};
use crate::workers::transcoder::MASTER_PLAYLIST;
use axum::extract::Multipart;
use tracing::{info, warn};
use url::Url;

pub const VIDEO_FIELD: &str = "video";

pub struct MediaService;

impl MediaService {
    /// Accepts a video for HLS encoding. The status record exists and the job
    /// is queued before this returns; encoding happens later.
    pub async fn upload_video_hls(
        state: &AppState,
        multipart: &mut Multipart,
    ) -> Result<SubmitVideoResponse, MediaError> {
        let media = &state.config.media;
        let file = receive_video(multipart, VIDEO_FIELD, &media.temp_dir, media.max_video_size).await?;

        let permit = match state.queue.reserve().await {
            Ok(p) => p,
            Err(full) => {
                warn!(job_id = %file.stem, "Encoding queue full, rejecting upload");
                discard(&file).await;
                return Err(full.into());
            }
        };

        if let Err(e) = state.status.create(&file.stem).await {
            discard(&file).await;
            return Err(e.into());
        }

        let job_id = file.stem.clone();
        permit
            .admit(EncodingJob {
                job_id: job_id.clone(),
                source_path: file.path,
            })
            .await;
        info!(job_id = %job_id, size = file.size, "Video queued for HLS encoding");

        Ok(SubmitVideoResponse {
            url: public_url(
                &state.config.public_host,
                &["static", "video-hls", &job_id, MASTER_PLAYLIST],
            ),
            job_id,
            media_type: MediaType::Hls,
        })
    }

    /// Stores a video as-is for range streaming.
    pub async fn upload_video(
        state: &AppState,
        multipart: &mut Multipart,
    ) -> Result<MediaResponse, MediaError> {
        let media = &state.config.media;
        let file = receive_video(multipart, VIDEO_FIELD, &media.video_dir, media.max_video_size).await?;

        Ok(MediaResponse {
            url: public_url(
                &state.config.public_host,
                &["static", "video-stream", &file.file_name],
            ),
            media_type: MediaType::Video,
        })
    }

    pub async fn get_video_status(
        state: &AppState,
        id: &str,
    ) -> Result<VideoStatusResponse, MediaError> {
        state
            .status
            .find(id)
            .await?
            .map(VideoStatusResponse::from)
            .ok_or_else(|| MediaError::NotFound(format!("Video '{}' not found", id)))
    }

    pub async fn queue_snapshot(state: &AppState) -> QueueSnapshot {
        state.queue.snapshot().await
    }
}

async fn discard(file: &StoredFile) {
    if let Err(e) = tokio::fs::remove_file(&file.path).await {
        warn!(path = %file.path.display(), error = %e, "Failed to remove rejected upload");
    }
}

/// Appends `segments` to the configured public host.
fn public_url(host: &str, segments: &[&str]) -> String {
    match Url::parse(host) {
        Ok(mut url) => {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
            url.to_string()
        }
        Err(_) => format!("{}/{}", host.trim_end_matches('/'), segments.join("/")),
    }
}
