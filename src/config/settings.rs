use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// 50 MiB, the ceiling the upload form has always enforced for videos.
pub const DEFAULT_MAX_VIDEO_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub public_host: String,
    pub media: MediaConfig,
}

/// Everything the ingestion path and the encoding worker need.
#[derive(Clone, Debug, Deserialize)]
pub struct MediaConfig {
    pub temp_dir: PathBuf,
    pub video_dir: PathBuf,
    pub hls_dir: PathBuf,
    pub max_video_size: u64,
    /// Waiting jobs allowed before admission is refused. 0 means unbounded.
    pub queue_capacity: usize,
    /// 0 disables the timeout.
    pub transcode_timeout_secs: u64,
    pub status_write_retries: u32,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub shutdown_grace_secs: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            redis_url: env::get(EnvKey::RedisUrl)?,
            jwt_secret: env::get(EnvKey::JwtSecret)?,
            public_host: env::get_or(EnvKey::PublicHost, "http://localhost:3000"),
            media: MediaConfig::from_env(),
        })
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        Self {
            temp_dir: env::get_or(EnvKey::UploadTempDir, "uploads/temp").into(),
            video_dir: env::get_or(EnvKey::UploadVideoDir, "uploads/videos").into(),
            hls_dir: env::get_or(EnvKey::UploadVideoHlsDir, "uploads/videos-hls").into(),
            max_video_size: env::get_parsed(EnvKey::MaxVideoSize, DEFAULT_MAX_VIDEO_SIZE),
            queue_capacity: env::get_parsed(EnvKey::EncodeQueueCapacity, 0),
            transcode_timeout_secs: env::get_parsed(EnvKey::TranscodeTimeoutSecs, 3600),
            status_write_retries: env::get_parsed(EnvKey::StatusWriteRetries, 3),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, "ffprobe"),
            shutdown_grace_secs: env::get_parsed(EnvKey::ShutdownGraceSecs, 30),
        }
    }

    pub fn transcode_timeout(&self) -> Option<Duration> {
        match self.transcode_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Creates the working directories if they are missing.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.temp_dir, &self.video_dir, &self.hls_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}
