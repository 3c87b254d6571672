//! Fakes and builders shared by the unit tests.

use crate::config::settings::{AppConfig, DEFAULT_MAX_VIDEO_SIZE, MediaConfig};
use crate::common::token::{TokenType, UserVerifyStatus, sign_for_test};
use crate::infrastructure::redis::client::TokenBlocklist;
use crate::modules::media::repository::memory::MemoryStatusStore;
use crate::state::AppState;
use crate::workers::encoding_queue::{EncodingQueue, QueueOptions};
use crate::workers::transcoder::{MASTER_PLAYLIST, TranscodeError, Transcoder};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};

pub const TEST_JWT_SECRET: &str = "test-secret";

/// Scripted stand-in for ffmpeg that records how it was driven.
pub struct FakeTranscoder {
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: watch::Sender<usize>,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
    fail_on: Vec<String>,
    panic_on: Vec<String>,
    output_root: Option<PathBuf>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: watch::channel(0).0,
            delay: None,
            gate: None,
            fail_on: Vec::new(),
            panic_on: Vec::new(),
            output_root: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Each transcode blocks until `release` hands it a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn failing_on(mut self, job_id: &str) -> Self {
        self.fail_on.push(job_id.to_string());
        self
    }

    pub fn panicking_on(mut self, job_id: &str) -> Self {
        self.panic_on.push(job_id.to_string());
        self
    }

    /// Successful jobs write a master playlist and one segment here.
    pub fn writing_to(mut self, root: &Path) -> Self {
        self.output_root = Some(root.to_path_buf());
        self
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub async fn wait_started(&self, n: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= n).await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, source: &Path, job_id: &str) -> Result<PathBuf, TranscodeError> {
        self.calls.lock().unwrap().push(job_id.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        self.started.send_modify(|started| *started += 1);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on.iter().any(|id| id == job_id) {
            panic!("transcoder blew up on {job_id}");
        }
        if self.fail_on.iter().any(|id| id == job_id) {
            return Err(TranscodeError::Process {
                program: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        if !source.exists() {
            return Err(TranscodeError::SourceMissing(source.to_path_buf()));
        }

        let root = match &self.output_root {
            Some(root) => root.join(job_id),
            None => return Ok(PathBuf::from(job_id).join(MASTER_PLAYLIST)),
        };
        tokio::fs::create_dir_all(root.join("v0")).await?;
        tokio::fs::write(
            root.join(MASTER_PLAYLIST),
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\nv0/index.m3u8\n",
        )
        .await?;
        tokio::fs::write(root.join("v0").join("segment_000.ts"), b"segment").await?;
        Ok(root.join(MASTER_PLAYLIST))
    }
}

/// Writes a small placeholder video named `<job_id>.mp4`.
pub async fn write_source(dir: &Path, job_id: &str) -> PathBuf {
    let path = dir.join(format!("{job_id}.mp4"));
    tokio::fs::write(&path, b"not really a video").await.unwrap();
    path
}

pub fn media_config(root: &Path) -> MediaConfig {
    MediaConfig {
        temp_dir: root.join("temp"),
        video_dir: root.join("videos"),
        hls_dir: root.join("videos-hls"),
        max_video_size: DEFAULT_MAX_VIDEO_SIZE,
        queue_capacity: 0,
        transcode_timeout_secs: 0,
        status_write_retries: 0,
        ffmpeg_path: "ffmpeg".to_string(),
        ffprobe_path: "ffprobe".to_string(),
        shutdown_grace_secs: 0,
    }
}

/// Revoked tokens held in memory instead of Redis.
#[derive(Default)]
pub struct MemoryBlocklist {
    revoked: Mutex<HashSet<String>>,
}

impl MemoryBlocklist {
    pub fn revoke(&self, token: &str) {
        self.revoked.lock().unwrap().insert(token.to_string());
    }
}

#[async_trait]
impl TokenBlocklist for MemoryBlocklist {
    async fn is_token_revoked(&self, token: &str) -> Result<bool, redis::RedisError> {
        Ok(self.revoked.lock().unwrap().contains(token))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStatusStore>,
    pub transcoder: Arc<FakeTranscoder>,
    pub blocklist: Arc<MemoryBlocklist>,
}

/// A signed access token for a user with the given verification state.
pub fn access_token(verify: UserVerifyStatus) -> String {
    sign_for_test(
        uuid::Uuid::new_v4(),
        TokenType::AccessToken,
        verify,
        TEST_JWT_SECRET,
    )
}

/// An `AppState` over in-memory stores and a fake transcoder writing into the HLS dir.
pub async fn test_app(media: MediaConfig) -> TestApp {
    media.ensure_dirs().await.unwrap();
    let store = Arc::new(MemoryStatusStore::new());
    let transcoder = Arc::new(FakeTranscoder::new().writing_to(&media.hls_dir));
    let queue = EncodingQueue::new(store.clone(), transcoder.clone(), QueueOptions::from(&media));

    let config = AppConfig {
        server_port: 0,
        database_url: String::new(),
        redis_url: String::new(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        public_host: "http://media.test".to_string(),
        media,
    };
    let blocklist = Arc::new(MemoryBlocklist::default());

    TestApp {
        state: AppState::new(config, store.clone(), queue, blocklist.clone()),
        store,
        transcoder,
        blocklist,
    }
}

/// A multipart body with one file part.
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    multipart_parts(&[(field, file_name, content_type, data)])
}

/// A multipart body with a file part per `(field, file_name, content_type, data)`.
pub fn multipart_parts(parts: &[(&str, &str, &str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "X-MEDIA-TEST-BOUNDARY";
    let mut body = Vec::new();
    for (field, file_name, content_type, data) in parts {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
