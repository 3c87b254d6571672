use crate::config::settings::MediaConfig;
use crate::modules::media::model::EncodingStatus;
use crate::modules::media::repository::{StatusStore, StoreError};
use crate::workers::transcoder::{TranscodeError, Transcoder};
use futures_util::FutureExt;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingJob {
    pub job_id: String,
    pub source_path: PathBuf,
}

#[derive(Debug, Error)]
#[error("Encoding queue is full ({capacity} jobs waiting)")]
pub struct QueueFull {
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct QueueSnapshot {
    /// Jobs admitted but not yet picked up by the worker.
    pub waiting: usize,
    /// Whether the worker is currently draining.
    pub busy: bool,
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Maximum number of waiting jobs; 0 means unbounded.
    pub capacity: usize,
    pub transcode_timeout: Option<Duration>,
    pub status_write_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&MediaConfig> for QueueOptions {
    fn from(config: &MediaConfig) -> Self {
        Self {
            capacity: config.queue_capacity,
            transcode_timeout: config.transcode_timeout(),
            status_write_retries: config.status_write_retries,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

struct QueueState {
    items: VecDeque<EncodingJob>,
    busy: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    /// Slots handed out by `reserve` that have not been admitted yet.
    reserved: AtomicUsize,
    busy_tx: watch::Sender<bool>,
    store: Arc<dyn StatusStore>,
    transcoder: Arc<dyn Transcoder>,
    options: QueueOptions,
}

/// FIFO of encoding jobs drained by at most one worker task at a time.
///
/// The worker is spawned by `admit` when the queue is idle and exits as soon
/// as the queue is empty again. `busy` is only read and written while the
/// state lock is held, so concurrent admissions never start a second worker.
#[derive(Clone)]
pub struct EncodingQueue {
    inner: Arc<Inner>,
}

/// A reserved queue slot. Dropping it without calling `admit` frees the slot.
pub struct QueuePermit {
    queue: EncodingQueue,
    admitted: bool,
}

impl QueuePermit {
    pub async fn admit(mut self, job: EncodingJob) {
        self.admitted = true;
        self.queue.push(job).await;
    }
}

impl Drop for QueuePermit {
    fn drop(&mut self) {
        if !self.admitted {
            self.queue.inner.reserved.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl EncodingQueue {
    pub fn new(
        store: Arc<dyn StatusStore>,
        transcoder: Arc<dyn Transcoder>,
        options: QueueOptions,
    ) -> Self {
        let (busy_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    busy: false,
                }),
                reserved: AtomicUsize::new(0),
                busy_tx,
                store,
                transcoder,
                options,
            }),
        }
    }

    /// Claims a slot for a job that is about to be admitted.
    pub async fn reserve(&self) -> Result<QueuePermit, QueueFull> {
        let capacity = self.inner.options.capacity;
        let state = self.inner.state.lock().await;
        if capacity > 0 && state.items.len() + self.inner.reserved.load(Ordering::SeqCst) >= capacity {
            return Err(QueueFull { capacity });
        }
        self.inner.reserved.fetch_add(1, Ordering::SeqCst);
        drop(state);

        Ok(QueuePermit {
            queue: self.clone(),
            admitted: false,
        })
    }

    /// Appends `job` and starts the worker if it is not already running.
    pub async fn admit(&self, job: EncodingJob) -> Result<(), QueueFull> {
        self.reserve().await?.admit(job).await;
        Ok(())
    }

    async fn push(&self, job: EncodingJob) {
        let mut state = self.inner.state.lock().await;
        self.inner.reserved.fetch_sub(1, Ordering::SeqCst);
        info!(job_id = %job.job_id, waiting = state.items.len() + 1, "Job admitted to encoding queue");
        state.items.push_back(job);

        if state.busy {
            return;
        }
        state.busy = true;
        self.inner.busy_tx.send_replace(true);
        drop(state);

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.drain().await });
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock().await;
        QueueSnapshot {
            waiting: state.items.len(),
            busy: state.busy,
        }
    }

    /// Resolves once the worker has emptied the queue and exited.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.busy_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|busy| !*busy).await;
    }
}

impl Inner {
    async fn drain(self: Arc<Self>) {
        debug!("Encoding worker started");
        loop {
            let job = {
                let mut state = self.state.lock().await;
                match state.items.pop_front() {
                    Some(job) => job,
                    None => {
                        state.busy = false;
                        self.busy_tx.send_replace(false);
                        debug!("Encoding queue is empty, worker exiting");
                        return;
                    }
                }
            };

            self.process(job).await;
        }
    }

    async fn process(&self, job: EncodingJob) {
        let job_id = job.job_id.as_str();

        if let Err(e) = self
            .write_status(job_id, EncodingStatus::Pending, EncodingStatus::Processing)
            .await
        {
            // The job never ran: the record stays Pending and the upload is
            // kept so recovery can admit it again on the next start.
            error!(job_id, error = %e, "Could not mark job as processing, leaving it pending");
            return;
        }

        info!(job_id, source = %job.source_path.display(), "Encoding started");
        let started = Instant::now();
        let outcome = self.run_transcoder(&job).await;

        // The source is gone before the terminal status becomes visible.
        remove_source(&job.source_path).await;

        let terminal = match &outcome {
            Ok(manifest) => {
                info!(
                    job_id,
                    manifest = %manifest.display(),
                    elapsed_secs = started.elapsed().as_secs(),
                    "Encoding succeeded"
                );
                EncodingStatus::Success
            }
            Err(e) => {
                error!(
                    job_id,
                    error = %e,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Encoding failed"
                );
                EncodingStatus::Failed
            }
        };

        if let Err(e) = self
            .write_status(job_id, EncodingStatus::Processing, terminal)
            .await
        {
            error!(job_id, status = %terminal, error = %e, "Could not record final status");
        }
    }

    async fn run_transcoder(&self, job: &EncodingJob) -> Result<PathBuf, TranscodeError> {
        let transcode =
            AssertUnwindSafe(self.transcoder.transcode(&job.source_path, &job.job_id)).catch_unwind();
        let outcome = match self.options.transcode_timeout {
            Some(limit) => tokio::time::timeout(limit, transcode)
                .await
                .map_err(|_| TranscodeError::TimedOut(limit))?,
            None => transcode.await,
        };
        outcome.unwrap_or(Err(TranscodeError::Panicked))
    }

    /// Applies a transition, retrying while the store reports itself unavailable.
    async fn write_status(
        &self,
        job_id: &str,
        from: EncodingStatus,
        to: EncodingStatus,
    ) -> Result<(), StoreError> {
        let retries = self.options.status_write_retries;
        let mut attempt = 0;
        loop {
            match self.store.transition(job_id, from, to).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt < retries => {
                    attempt += 1;
                    warn!(job_id, status = %to, attempt, error = %e, "Status write failed, retrying");
                    tokio::time::sleep(self.options.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn remove_source(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed source file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove source file"),
    }
}
