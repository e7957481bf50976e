//! Persistent backing stores.
//!
//! A backend sits behind the in-memory map: the cache writes through to it
//! on `put` and reads through to it on a memory miss. [`FileBackend`] keeps
//! one JSON record per fingerprint so a torn or corrupted write can only ever
//! damage its own record.

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::store::CacheEntry;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Durable storage for cache entries.
pub trait CacheBackend: Send + Sync + 'static {
    /// Loads the record for `key`. `Ok(None)` when no record exists.
    fn load(&self, key: Fingerprint) -> BoxFuture<'_, Result<Option<CacheEntry>, CacheError>>;

    /// Writes `entry`, replacing any previous record for its key.
    fn store(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Removes the record for `key`. Removing a missing record succeeds.
    fn remove(&self, key: Fingerprint) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Removes every record.
    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Removes records that expired before `now` or cannot be decoded.
    /// Returns the keys of the removed records.
    fn purge_expired(&self, now: SystemTime) -> BoxFuture<'_, Result<Vec<String>, CacheError>>;
}

/// On-disk layout of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    key: String,
    value: String,
    created_at_ms: u64,
    expires_at_ms: u64,
}

impl Record {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.to_string(),
            value: STANDARD.encode(&entry.value),
            created_at_ms: to_millis(entry.created_at),
            expires_at_ms: to_millis(entry.expires_at),
        }
    }

    fn into_entry(self, expected: &str) -> Result<CacheEntry, CacheError> {
        if self.key != expected {
            return Err(corruption(expected, "record key does not match file name"));
        }
        let key = Fingerprint::from_hex(&self.key)
            .map_err(|_| corruption(expected, "record key is not a fingerprint"))?;
        let value = STANDARD
            .decode(self.value.as_bytes())
            .map_err(|e| corruption(expected, &format!("value is not base64: {e}")))?;
        Ok(CacheEntry {
            key,
            value: Bytes::from(value),
            created_at: from_millis(self.created_at_ms),
            expires_at: from_millis(self.expires_at_ms),
        })
    }
}

fn to_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn from_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

fn corruption(key: &str, reason: &str) -> CacheError {
    CacheError::Corruption {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Stores each entry as `<dir>/<fingerprint>.json`.
///
/// Writes go to a uniquely named temporary file in the same directory and are
/// renamed over the target once flushed, so readers see either the old record
/// or the new one.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileBackend {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    /// The directory records live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXT}"))
    }

    fn temp_path(&self, key: &Fingerprint) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{key}.{}.{seq}.{TEMP_EXT}", std::process::id()))
    }

    async fn read_record(&self, path: &Path, stem: &str) -> Result<Option<CacheEntry>, CacheError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: Record = serde_json::from_slice(&raw)
            .map_err(|e| corruption(stem, &format!("invalid record: {e}")))?;
        record.into_entry(stem).map(Some)
    }

    async fn write_record(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let body = serde_json::to_vec(&Record::from_entry(entry))
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))?;
        let temp = self.temp_path(&entry.key);

        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, self.record_path(&entry.key)).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_path(path: &Path) -> Result<(), CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists `(path, stem)` for every record file and every leftover temp file.
    async fn scan(&self) -> Result<(Vec<(PathBuf, String)>, Vec<PathBuf>), CacheError> {
        let mut records = Vec::new();
        let mut temps = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(RECORD_EXT) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        let stem = stem.to_string();
                        records.push((path, stem));
                    }
                }
                Some(TEMP_EXT) => temps.push(path),
                _ => {}
            }
        }
        Ok((records, temps))
    }
}

impl CacheBackend for FileBackend {
    fn load(&self, key: Fingerprint) -> BoxFuture<'_, Result<Option<CacheEntry>, CacheError>> {
        Box::pin(async move {
            let path = self.record_path(&key);
            self.read_record(&path, key.as_str()).await
        })
    }

    fn store(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move { self.write_record(&entry).await })
    }

    fn remove(&self, key: Fingerprint) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move { Self::remove_path(&self.record_path(&key)).await })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            let (records, temps) = self.scan().await?;
            for (path, _) in records {
                Self::remove_path(&path).await?;
            }
            for path in temps {
                Self::remove_path(&path).await?;
            }
            Ok(())
        })
    }

    fn purge_expired(&self, now: SystemTime) -> BoxFuture<'_, Result<Vec<String>, CacheError>> {
        Box::pin(async move {
            let (records, _) = self.scan().await?;
            let mut purged = Vec::new();
            for (path, stem) in records {
                let stale = match self.read_record(&path, &stem).await {
                    Ok(Some(entry)) => !entry.is_live(now),
                    Ok(None) => false,
                    Err(e) if e.is_corruption() => {
                        tracing::warn!(key = %stem, error = %e, "dropping corrupt cache record");
                        true
                    }
                    Err(e) => return Err(e),
                };
                if stale {
                    Self::remove_path(&path).await?;
                    purged.push(stem);
                }
            }
            Ok(purged)
        })
    }
}
