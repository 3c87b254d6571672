use axum::{
    extract::{Multipart, multipart::Field, multipart::MultipartError},
    http::StatusCode,
};
use bytes::Bytes;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

const DEFAULT_VIDEO_EXTENSION: &str = "mp4";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No '{0}' field found in multipart request")]
    MissingField(&'static str),
    #[error("Invalid content type '{0}': only video/* is allowed")]
    InvalidContentType(String),
    #[error("Only one '{0}' file is allowed per request")]
    TooManyFiles(&'static str),
    #[error("File is empty")]
    Empty,
    #[error("File exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("Malformed multipart request: {0}")]
    Multipart(String),
    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MultipartError> for UploadError {
    fn from(e: MultipartError) -> Self {
        // The body limit layer surfaces as a multipart error.
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge { limit: 0 }
        } else {
            UploadError::Multipart(e.body_text())
        }
    }
}

/// A file that made it to disk intact.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    /// `<stem>.<extension>`
    pub file_name: String,
    /// Generated name without the extension.
    pub stem: String,
    pub size: u64,
}

/// Streams chunks into a file, refusing to grow past `max_size`.
pub struct DiskWriter {
    path: PathBuf,
    file: File,
    written: u64,
    max_size: u64,
}

impl DiskWriter {
    pub async fn new(path: PathBuf, max_size: u64) -> std::io::Result<Self> {
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file,
            written: 0,
            max_size,
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), UploadError> {
        let len = chunk.len() as u64;
        if self.written + len > self.max_size {
            return Err(UploadError::TooLarge {
                limit: self.max_size,
            });
        }
        self.file.write_all(&chunk).await?;
        self.written += len;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<u64, UploadError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.written)
    }

    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to remove partial upload");
        }
    }
}

/// Keeps the original extension when it is short and alphanumeric, falls
/// back to one guessed from the content type, then to mp4.
fn pick_extension(original_name: Option<&str>, content_type: &mime::Mime) -> String {
    let from_name = original_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    if let Some(ext) = from_name {
        return ext.to_ascii_lowercase();
    }

    mime_guess::get_mime_extensions(content_type)
        .and_then(|exts| exts.first())
        .map(|e| e.to_string())
        .unwrap_or_else(|| DEFAULT_VIDEO_EXTENSION.to_string())
}

fn parse_video_mime(field: &Field<'_>) -> Result<mime::Mime, UploadError> {
    let raw = field.content_type().unwrap_or("application/octet-stream");
    match raw.parse::<mime::Mime>() {
        Ok(m) if m.type_() == mime::VIDEO => Ok(m),
        _ => Err(UploadError::InvalidContentType(raw.to_string())),
    }
}

async fn stream_to_disk(
    mut field: Field<'_>,
    dir: &Path,
    max_size: u64,
) -> Result<StoredFile, UploadError> {
    let content_type = parse_video_mime(&field)?;
    let extension = pick_extension(field.file_name(), &content_type);
    let stem = Uuid::new_v4().simple().to_string();
    let file_name = format!("{stem}.{extension}");
    let path = dir.join(&file_name);

    let mut writer = DiskWriter::new(path.clone(), max_size).await?;

    while let Some(chunk) = field.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Stream error: {}", e);
                writer.abort().await;
                return Err(e.into());
            }
        };

        if let Err(e) = writer.write_chunk(chunk).await {
            error!("Upload error: {}", e);
            writer.abort().await;
            return Err(match e {
                UploadError::TooLarge { .. } => UploadError::TooLarge { limit: max_size },
                other => other,
            });
        }
    }

    let size = writer.finish().await?;
    if size == 0 {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(UploadError::Empty);
    }

    info!(file = %file_name, size, "Stored uploaded video");
    Ok(StoredFile {
        path,
        file_name,
        stem,
        size,
    })
}

fn map_multipart_error(e: MultipartError, max_size: u64) -> UploadError {
    match UploadError::from(e) {
        UploadError::TooLarge { .. } => UploadError::TooLarge { limit: max_size },
        other => other,
    }
}

/// Streams the single `field_name` part of the request into `dir` under a
/// freshly generated name. Other parts are skipped; a second `field_name`
/// part rejects the whole request and removes the stored file.
pub async fn receive_video(
    multipart: &mut Multipart,
    field_name: &'static str,
    dir: &Path,
    max_size: u64,
) -> Result<StoredFile, UploadError> {
    let mut stored: Option<StoredFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                discard(stored.as_ref()).await;
                return Err(map_multipart_error(e, max_size));
            }
        };

        if field.name() != Some(field_name) {
            continue;
        }
        if stored.is_some() {
            warn!("Rejecting request with more than one '{}' part", field_name);
            discard(stored.as_ref()).await;
            return Err(UploadError::TooManyFiles(field_name));
        }
        stored = Some(stream_to_disk(field, dir, max_size).await?);
    }

    stored.ok_or(UploadError::MissingField(field_name))
}

async fn discard(file: Option<&StoredFile>) {
    if let Some(file) = file {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            warn!(path = %file.path.display(), error = %e, "Failed to remove rejected upload");
        }
    }
}
