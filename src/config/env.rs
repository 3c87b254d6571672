use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    JwtSecret,
    PublicHost,
    UploadTempDir,
    UploadVideoDir,
    UploadVideoHlsDir,
    MaxVideoSize,
    EncodeQueueCapacity,
    TranscodeTimeoutSecs,
    StatusWriteRetries,
    FfmpegPath,
    FfprobePath,
    ShutdownGraceSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::JwtSecret => "JWT_SECRET",
            EnvKey::PublicHost => "PUBLIC_HOST",
            EnvKey::UploadTempDir => "UPLOAD_TEMP_DIR",
            EnvKey::UploadVideoDir => "UPLOAD_VIDEO_DIR",
            EnvKey::UploadVideoHlsDir => "UPLOAD_VIDEO_HLS_DIR",
            EnvKey::MaxVideoSize => "MAX_VIDEO_SIZE",
            EnvKey::EncodeQueueCapacity => "ENCODE_QUEUE_CAPACITY",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::StatusWriteRetries => "STATUS_WRITE_RETRIES",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::FfprobePath => "FFPROBE_PATH",
            EnvKey::ShutdownGraceSecs => "SHUTDOWN_GRACE_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
