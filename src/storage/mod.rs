use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub mod accounting;

pub use accounting::{FileAccounting, LoggedRequest, MemoryAccounting, RequestAccounting};

/// Boxed future returned by the storage traits
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Key/value cache with per-entry expiration
///
/// Used for the exchanged access token and for resource metadata. Entries
/// without a TTL live until deleted.
pub trait CacheStore: Send + Sync {
    /// Read a live entry, `None` if missing or expired
    fn get(&self, key: &str) -> StorageFuture<'_, Option<Value>>;

    /// Write an entry, replacing any previous value
    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> StorageFuture<'_, ()>;

    /// Check whether a live entry exists
    fn has(&self, key: &str) -> StorageFuture<'_, bool>;

    /// Delete an entry; deleting a missing key is not an error
    fn delete(&self, key: &str) -> StorageFuture<'_, ()>;
}

/// Storage errors
#[derive(Debug)]
pub enum StorageError {
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
    /// Lock poisoned by a panicking writer
    Lock(String),
    /// Path error
    Path(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::Lock(msg) => write!(f, "Lock error: {}", msg),
            StorageError::Path(msg) => write!(f, "Path error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// Process-local cache
///
/// Nothing survives the process. Suitable for tests and short-lived tools.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    /// Create an empty in-memory cache
    pub fn new() -> Self {
        Self::default()
    }

    fn read_live(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StorageError::Lock(format!("Cache lock poisoned: {}", e)))?;

        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone()))
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<Value>> {
        let result = self.read_live(key);
        Box::pin(async move { result })
    }

    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> StorageFuture<'_, ()> {
        let result = self
            .entries
            .write()
            .map_err(|e| StorageError::Lock(format!("Cache lock poisoned: {}", e)))
            .map(|mut entries| {
                entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: value.clone(),
                        expires_at: ttl.map(|ttl| Instant::now() + ttl),
                    },
                );
            });
        Box::pin(async move { result })
    }

    fn has(&self, key: &str) -> StorageFuture<'_, bool> {
        let result = self.read_live(key).map(|v| v.is_some());
        Box::pin(async move { result })
    }

    fn delete(&self, key: &str) -> StorageFuture<'_, ()> {
        let result = self
            .entries
            .write()
            .map_err(|e| StorageError::Lock(format!("Cache lock poisoned: {}", e)))
            .map(|mut entries| {
                entries.remove(key);
            });
        Box::pin(async move { result })
    }
}

/// On-disk cache entry
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    /// Unix timestamp after which the entry is dead
    expires_at: Option<i64>,
    value: Value,
}

/// Filesystem-backed cache, one JSON file per key
///
/// Entries are plain JSON on disk, readable by the owner only on Unix.
/// Concurrent writers are not coordinated.
pub struct FilesystemCache {
    base_path: PathBuf,
}

impl FilesystemCache {
    /// Create a filesystem cache rooted at `base_path`, creating it if needed
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_path })
    }

    /// Default cache location under the user's cache directory
    pub fn default_path() -> Result<PathBuf, StorageError> {
        dirs::cache_dir()
            .map(|dir| dir.join("campaign-sdk"))
            .ok_or_else(|| StorageError::Path("Cannot determine cache directory".to_string()))
    }

    /// Map a cache key onto a file name inside the cache directory
    fn resolve_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.json", name))
    }

    async fn read_live(path: PathBuf) -> Result<Option<Value>, StorageError> {
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {:?}: {}", path, e);
                return Ok(None);
            }
        };

        if let Some(expires_at) = entry.expires_at {
            if chrono::Utc::now().timestamp() >= expires_at {
                tracing::debug!("Cache entry expired: {:?}", path);
                return Ok(None);
            }
        }

        Ok(Some(entry.value))
    }
}

impl CacheStore for FilesystemCache {
    fn get(&self, key: &str) -> StorageFuture<'_, Option<Value>> {
        let path = self.resolve_path(key);
        Box::pin(Self::read_live(path))
    }

    fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> StorageFuture<'_, ()> {
        let path = self.resolve_path(key);
        let entry = FileEntry {
            expires_at: ttl.map(|ttl| chrono::Utc::now().timestamp() + ttl.as_secs() as i64),
            value: value.clone(),
        };

        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let data = serde_json::to_vec(&entry)?;
            tokio::fs::write(&path, data).await?;

            // Entries hold bearer tokens; keep them owner-only (0600)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let permissions = std::fs::Permissions::from_mode(0o600);
                tokio::fs::set_permissions(&path, permissions).await?;
            }

            tracing::debug!("Wrote cache entry: {:?}", path);
            Ok(())
        })
    }

    fn has(&self, key: &str) -> StorageFuture<'_, bool> {
        let path = self.resolve_path(key);
        Box::pin(async move { Ok(Self::read_live(path).await?.is_some()) })
    }

    fn delete(&self, key: &str) -> StorageFuture<'_, ()> {
        let path = self.resolve_path(key);

        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!("Removed cache entry: {:?}", path);
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_cache_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("token", &json!({"a": 1}), None).await.unwrap();

        assert!(cache.has("token").await.unwrap());
        assert_eq!(cache.get("token").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_memory_cache_expired_entry_is_missing() {
        let cache = MemoryCache::new();
        cache
            .set("token", &json!("v"), Some(Duration::from_secs(0)))
            .await
            .unwrap();

        assert!(!cache.has("token").await.unwrap());
        assert_eq!(cache.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_delete() {
        let cache = MemoryCache::new();
        cache.set("token", &json!("v"), None).await.unwrap();
        cache.delete("token").await.unwrap();
        cache.delete("token").await.unwrap();

        assert!(!cache.has("token").await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_cache_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path()).unwrap();

        cache
            .set("Metadata_profile", &json!({"content": {}}), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(temp_dir.path().join("Metadata_profile.json").exists());
        assert_eq!(
            cache.get("Metadata_profile").await.unwrap(),
            Some(json!({"content": {}}))
        );
    }

    #[tokio::test]
    async fn test_filesystem_cache_expired_entry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path()).unwrap();

        cache
            .set("aec.token", &json!("v"), Some(Duration::from_secs(0)))
            .await
            .unwrap();

        assert!(!cache.has("aec.token").await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_cache_sanitizes_keys() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path()).unwrap();

        cache.set("../escape/key", &json!(1), None).await.unwrap();

        assert!(temp_dir.path().join(".._escape_key.json").exists());
        assert_eq!(cache.get("../escape/key").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_filesystem_cache_missing_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path()).unwrap();

        assert_eq!(cache.get("nothing").await.unwrap(), None);

        cache.set("k", &json!(true), None).await.unwrap();
        cache.delete("k").await.unwrap();
        assert!(!cache.has("k").await.unwrap());
        cache.delete("k").await.unwrap();
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_filesystem_cache_entries_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path()).unwrap();

        cache
            .set("aec.token", &json!({"access_token": "secret"}), None)
            .await
            .unwrap();

        let metadata = std::fs::metadata(temp_dir.path().join("aec.token.json")).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }
}
