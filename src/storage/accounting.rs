//! Daily request accounting for the dispatcher throttle.
//!
//! One counter per calendar day plus a log of the requests that were held
//! back instead of sent. The file-backed implementation reads, increments and
//! rewrites the counter without locking, so separate processes sharing a log
//! directory can miscount.

use super::{StorageError, StorageFuture};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// A mutating request that was logged instead of sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRequest {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Counter and log port used by the throttle
pub trait RequestAccounting: Send + Sync {
    /// Increment the counter for `day` and return the new value
    fn increment(&self, day: NaiveDate) -> StorageFuture<'_, u64>;

    /// Current counter value for `day`
    fn count(&self, day: NaiveDate) -> StorageFuture<'_, u64>;

    /// Append a held-back request to the log for `day`
    fn record(&self, day: NaiveDate, request: &LoggedRequest) -> StorageFuture<'_, ()>;
}

/// In-memory accounting, used when file logging is disabled and in tests
#[derive(Default)]
pub struct MemoryAccounting {
    counters: Mutex<HashMap<NaiveDate, u64>>,
    logged: Mutex<Vec<(NaiveDate, LoggedRequest)>>,
}

impl MemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests logged for `day`, in order
    pub fn logged(&self, day: NaiveDate) -> Vec<LoggedRequest> {
        self.logged
            .lock()
            .map(|logged| {
                logged
                    .iter()
                    .filter(|(d, _)| *d == day)
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RequestAccounting for MemoryAccounting {
    fn increment(&self, day: NaiveDate) -> StorageFuture<'_, u64> {
        let result = self
            .counters
            .lock()
            .map_err(|e| StorageError::Lock(format!("Counter lock poisoned: {}", e)))
            .map(|mut counters| {
                let counter = counters.entry(day).or_insert(0);
                *counter += 1;
                *counter
            });
        Box::pin(async move { result })
    }

    fn count(&self, day: NaiveDate) -> StorageFuture<'_, u64> {
        let result = self
            .counters
            .lock()
            .map_err(|e| StorageError::Lock(format!("Counter lock poisoned: {}", e)))
            .map(|counters| counters.get(&day).copied().unwrap_or(0));
        Box::pin(async move { result })
    }

    fn record(&self, day: NaiveDate, request: &LoggedRequest) -> StorageFuture<'_, ()> {
        let result = self
            .logged
            .lock()
            .map_err(|e| StorageError::Lock(format!("Log lock poisoned: {}", e)))
            .map(|mut logged| logged.push((day, request.clone())));
        Box::pin(async move { result })
    }
}

/// Flat-file accounting under a log directory
///
/// Writes `{YYYY-MM-DD}.count` holding the decimal counter and
/// `{YYYY-MM-DD}.requests.log` holding one JSON object per logged request.
pub struct FileAccounting {
    log_dir: PathBuf,
}

impl FileAccounting {
    /// Create file accounting rooted at `log_dir`, creating it if needed
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let log_dir = log_dir.as_ref().to_path_buf();

        if !log_dir.exists() {
            std::fs::create_dir_all(&log_dir)?;
        }

        Ok(Self { log_dir })
    }

    fn counter_path(&self, day: NaiveDate) -> PathBuf {
        self.log_dir.join(format!("{}.count", day.format("%Y-%m-%d")))
    }

    fn log_path(&self, day: NaiveDate) -> PathBuf {
        self.log_dir
            .join(format!("{}.requests.log", day.format("%Y-%m-%d")))
    }

    async fn read_counter(path: &Path) -> Result<u64, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Resetting unreadable request counter {:?}", path);
                0
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl RequestAccounting for FileAccounting {
    fn increment(&self, day: NaiveDate) -> StorageFuture<'_, u64> {
        let path = self.counter_path(day);

        Box::pin(async move {
            let count = Self::read_counter(&path).await? + 1;
            tokio::fs::write(&path, count.to_string()).await?;
            Ok(count)
        })
    }

    fn count(&self, day: NaiveDate) -> StorageFuture<'_, u64> {
        let path = self.counter_path(day);
        Box::pin(async move { Self::read_counter(&path).await })
    }

    fn record(&self, day: NaiveDate, request: &LoggedRequest) -> StorageFuture<'_, ()> {
        let path = self.log_path(day);
        let line = serde_json::to_string(request);

        Box::pin(async move {
            let mut line = line?;
            line.push('\n');

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            tracing::debug!("Appended request to {:?}", path);
            Ok(())
        })
    }
}
