use crate::modules::media::model::EncodingStatus;
use crate::modules::media::repository::{StatusStore, StoreError};
use crate::workers::encoding_queue::{EncodingJob, EncodingQueue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs that were mid-transcode when the process stopped.
    pub interrupted: usize,
    pub requeued: usize,
    /// Pending jobs that did not fit in the queue and wait for the next start.
    pub deferred: usize,
    pub orphans_removed: usize,
}

/// Temp uploads keyed by file stem, which is the job id.
async fn temp_files_by_stem(temp_dir: &Path) -> std::io::Result<HashMap<String, PathBuf>> {
    let mut files = HashMap::new();
    let mut entries = tokio::fs::read_dir(temp_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.insert(stem.to_string(), path.clone());
        }
    }
    Ok(files)
}

/// Reconciles the status store with the empty in-memory queue after a
/// restart. Must run before the server accepts uploads.
///
/// Processing records are failed, Pending records are re-admitted oldest
/// first, and temp files that belong to no re-admitted job are removed.
pub async fn recover_jobs(
    store: &dyn StatusStore,
    queue: &EncodingQueue,
    temp_dir: &Path,
) -> Result<RecoveryReport, StoreError> {
    let mut report = RecoveryReport::default();

    for record in store.list_by_status(EncodingStatus::Processing).await? {
        store
            .transition(&record.name, EncodingStatus::Processing, EncodingStatus::Failed)
            .await?;
        warn!(job_id = %record.name, "Encoding was interrupted by a restart, marked as failed");
        report.interrupted += 1;
    }

    let mut temp_files = match temp_files_by_stem(temp_dir).await {
        Ok(files) => files,
        Err(e) => {
            warn!(dir = %temp_dir.display(), error = %e, "Could not scan upload temp dir");
            HashMap::new()
        }
    };

    for record in store.list_by_status(EncodingStatus::Pending).await? {
        // A missing source still goes through the worker, which fails it.
        let source_path = temp_files
            .remove(&record.name)
            .unwrap_or_else(|| temp_dir.join(&record.name));

        let job = EncodingJob {
            job_id: record.name.clone(),
            source_path: source_path.clone(),
        };
        match queue.admit(job).await {
            Ok(()) => report.requeued += 1,
            Err(full) => {
                warn!(job_id = %record.name, error = %full, "Queue full, job stays pending");
                // Keep the upload for the next start.
                temp_files.insert(record.name.clone(), source_path);
                report.deferred += 1;
            }
        }
    }

    // Deferred jobs keep their files; everything else left over has no job.
    for (stem, path) in temp_files {
        if store.find(&stem).await?.is_some_and(|r| r.status == EncodingStatus::Pending) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.orphans_removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove orphaned upload"),
        }
    }

    info!(
        interrupted = report.interrupted,
        requeued = report.requeued,
        deferred = report.deferred,
        orphans_removed = report.orphans_removed,
        "Encoding queue recovered"
    );
    Ok(report)
}
