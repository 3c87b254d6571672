use super::model::{EncodingStatus, VideoStatus};
use crate::infrastructure::db::pool::DbPool;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Video status '{0}' already exists")]
    Duplicate(String),
    #[error("Video status '{0}' not found")]
    NotFound(String),
    #[error("Invalid status transition for '{name}': {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: EncodingStatus,
        to: EncodingStatus,
    },
    #[error("Status store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Only connectivity problems are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Durable per-video encoding status, one record per job id.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Inserts a Pending record. Fails with `Duplicate` if the name is taken.
    async fn create(&self, name: &str) -> Result<VideoStatus, StoreError>;

    async fn find(&self, name: &str) -> Result<Option<VideoStatus>, StoreError>;

    /// Moves `name` from `from` to `to`, only if it is currently in `from`.
    async fn transition(
        &self,
        name: &str,
        from: EncodingStatus,
        to: EncodingStatus,
    ) -> Result<VideoStatus, StoreError>;

    /// Oldest first.
    async fn list_by_status(&self, status: EncodingStatus) -> Result<Vec<VideoStatus>, StoreError>;
}

#[derive(Clone)]
pub struct VideoStatusRepository {
    pool: DbPool,
}

impl VideoStatusRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for VideoStatusRepository {
    async fn create(&self, name: &str) -> Result<VideoStatus, StoreError> {
        sqlx::query_as::<_, VideoStatus>(
            r#"
            INSERT INTO video_status (name, status)
            VALUES ($1, 'PENDING')
            RETURNING name, status, created_at, updated_at
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Duplicate(name.to_string())
            }
            other => other.into(),
        })
    }

    async fn find(&self, name: &str) -> Result<Option<VideoStatus>, StoreError> {
        let record = sqlx::query_as::<_, VideoStatus>(
            r#"
            SELECT name, status, created_at, updated_at
            FROM video_status
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn transition(
        &self,
        name: &str,
        from: EncodingStatus,
        to: EncodingStatus,
    ) -> Result<VideoStatus, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                name: name.to_string(),
                from,
                to,
            });
        }

        let updated = sqlx::query_as::<_, VideoStatus>(
            r#"
            UPDATE video_status
            SET status = $1, updated_at = NOW()
            WHERE name = $2 AND status = $3
            RETURNING name, status, created_at, updated_at
            "#,
        )
        .bind(to)
        .bind(name)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(record) => Ok(record),
            // Nothing matched: either the record is gone or it is not in `from`.
            None => match self.find(name).await? {
                Some(current) => Err(StoreError::InvalidTransition {
                    name: name.to_string(),
                    from: current.status,
                    to,
                }),
                None => Err(StoreError::NotFound(name.to_string())),
            },
        }
    }

    async fn list_by_status(&self, status: EncodingStatus) -> Result<Vec<VideoStatus>, StoreError> {
        let records = sqlx::query_as::<_, VideoStatus>(
            r#"
            SELECT name, status, created_at, updated_at
            FROM video_status
            WHERE status = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use time::OffsetDateTime;

    /// In-process store with a write log and injectable write failures.
    #[derive(Default)]
    pub struct MemoryStatusStore {
        records: Mutex<HashMap<String, VideoStatus>>,
        history: Mutex<Vec<(String, EncodingStatus)>>,
        failing_writes: AtomicU32,
        unavailable: AtomicBool,
    }

    impl MemoryStatusStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// The next `n` transitions fail with `Unavailable`.
        pub fn fail_next_writes(&self, n: u32) {
            self.failing_writes.store(n, Ordering::SeqCst);
        }

        /// Every call fails with `Unavailable` until switched back.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Every status each record has been written with, in write order.
        pub fn history_of(&self, name: &str) -> Vec<EncodingStatus> {
            self.history
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, s)| *s)
                .collect()
        }

        /// Names in the order they first reached `status`.
        pub fn order_reaching(&self, status: EncodingStatus) -> Vec<String> {
            self.history
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, s)| *s == status)
                .map(|(n, _)| n.clone())
                .collect()
        }

        /// Seeds a record directly, bypassing the state machine.
        pub fn insert(&self, name: &str, status: EncodingStatus, created_at: OffsetDateTime) {
            self.records.lock().unwrap().insert(
                name.to_string(),
                VideoStatus {
                    name: name.to_string(),
                    status,
                    created_at,
                    updated_at: created_at,
                },
            );
        }

        fn check_available(&self) -> Result<(), StoreError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store is down".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StatusStore for MemoryStatusStore {
        async fn create(&self, name: &str) -> Result<VideoStatus, StoreError> {
            self.check_available()?;
            let mut records = self.records.lock().unwrap();
            if records.contains_key(name) {
                return Err(StoreError::Duplicate(name.to_string()));
            }
            let now = OffsetDateTime::now_utc();
            let record = VideoStatus {
                name: name.to_string(),
                status: EncodingStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            records.insert(name.to_string(), record.clone());
            self.history
                .lock()
                .unwrap()
                .push((name.to_string(), EncodingStatus::Pending));
            Ok(record)
        }

        async fn find(&self, name: &str) -> Result<Option<VideoStatus>, StoreError> {
            self.check_available()?;
            Ok(self.records.lock().unwrap().get(name).cloned())
        }

        async fn transition(
            &self,
            name: &str,
            from: EncodingStatus,
            to: EncodingStatus,
        ) -> Result<VideoStatus, StoreError> {
            self.check_available()?;
            let pending_failures = self.failing_writes.load(Ordering::SeqCst);
            if pending_failures > 0 {
                self.failing_writes.store(pending_failures - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("injected write failure".to_string()));
            }
            if !from.can_transition_to(to) {
                return Err(StoreError::InvalidTransition {
                    name: name.to_string(),
                    from,
                    to,
                });
            }

            let mut records = self.records.lock().unwrap();
            let record = records
                .get_mut(name)
                .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            if record.status != from {
                return Err(StoreError::InvalidTransition {
                    name: name.to_string(),
                    from: record.status,
                    to,
                });
            }
            record.status = to;
            record.updated_at = OffsetDateTime::now_utc();
            self.history.lock().unwrap().push((name.to_string(), to));
            Ok(record.clone())
        }

        async fn list_by_status(
            &self,
            status: EncodingStatus,
        ) -> Result<Vec<VideoStatus>, StoreError> {
            self.check_available()?;
            let mut records: Vec<VideoStatus> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.status == status)
                .cloned()
                .collect();
            records.sort_by_key(|r| r.created_at);
            Ok(records)
        }
    }

    #[tokio::test]
    async fn transition_is_guarded_by_current_status() {
        let store = MemoryStatusStore::new();
        store.create("abc").await.unwrap();

        let err = store
            .transition("abc", EncodingStatus::Processing, EncodingStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { from: EncodingStatus::Pending, .. }
        ));

        store
            .transition("abc", EncodingStatus::Pending, EncodingStatus::Processing)
            .await
            .unwrap();
        let done = store
            .transition("abc", EncodingStatus::Processing, EncodingStatus::Failed)
            .await
            .unwrap();
        assert_eq!(done.status, EncodingStatus::Failed);
        assert!(done.updated_at >= done.created_at);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let store = MemoryStatusStore::new();
        store.create("abc").await.unwrap();
        assert!(matches!(
            store.create("abc").await,
            Err(StoreError::Duplicate(_))
        ));
    }
}
