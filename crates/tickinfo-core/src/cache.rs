//! On-disk cache of resolved records, one JSON line per ticker.
//!
//! Every mutation rewrites the whole file: the new contents are staged in a
//! temporary file next to the store and atomically renamed over it, so readers
//! never observe a partial write. Mutations hold the exclusive side of an
//! async lock; reads hold the shared side. File work itself runs on tokio's
//! blocking pool while the guard is held.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{CacheError, Record, Ticker, UtcDateTime};

/// Records older than this are purged on read.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One persisted line of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheEntry {
    pub id: Ticker,
    pub created_at: UtcDateTime,
    pub record: Record,
}

impl CacheEntry {
    pub fn new(id: Ticker, created_at: UtcDateTime, record: Record) -> Self {
        Self {
            id,
            created_at,
            record,
        }
    }

    /// Live while its age does not exceed `ttl`.
    pub fn is_live(&self, now: UtcDateTime, ttl: time::Duration) -> bool {
        self.created_at.age_at(now) <= ttl
    }
}

#[derive(Debug)]
struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    /// Decodes every well-formed line; corrupt lines are logged and skipped.
    fn load(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(CacheError::io(&self.path, error)),
        };

        let mut entries = Vec::new();
        for (index, line) in bytes.split(|byte| *byte == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<CacheEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(error) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    %error,
                    "skipping corrupt cache entry"
                ),
            }
        }
        Ok(entries)
    }

    /// Loads the store with duplicate ids collapsed to their last occurrence.
    fn load_compacted(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut positions: HashMap<Ticker, usize> = HashMap::new();
        let mut entries: Vec<CacheEntry> = Vec::new();
        for entry in self.load()? {
            match positions.get(&entry.id) {
                Some(&position) => entries[position] = entry,
                None => {
                    positions.insert(entry.id.clone(), entries.len());
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn find(&self, id: &Ticker) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.load()?.into_iter().rev().find(|entry| entry.id == *id))
    }

    fn commit(&self, entries: &[CacheEntry]) -> Result<(), CacheError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|error| CacheError::io(dir, error))?;

        let mut buffer = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }

        let mut staging = NamedTempFile::new_in(dir).map_err(|error| CacheError::io(dir, error))?;
        staging
            .write_all(&buffer)
            .and_then(|()| staging.as_file().sync_all())
            .map_err(|error| CacheError::io(staging.path(), error))?;
        staging
            .persist(&self.path)
            .map_err(|error| CacheError::Persist {
                path: self.path.clone(),
                source: error.error,
            })?;
        Ok(())
    }

    fn remove(&self) -> Result<bool, CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(CacheError::io(&self.path, error)),
        }
    }
}

/// Thread-safe, file-backed cache store keyed by ticker.
#[derive(Debug, Clone)]
pub struct CacheStore {
    file: Arc<CacheFile>,
    ttl: time::Duration,
    lock: Arc<RwLock<()>>,
}

impl CacheStore {
    /// Create a store persisted at `path` with the given time-to-live.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            file: Arc::new(CacheFile { path: path.into() }),
            ttl: time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX),
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// Create a store with the 24 hour default TTL.
    pub fn with_default_ttl(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DEFAULT_CACHE_TTL)
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn ttl(&self) -> time::Duration {
        self.ttl
    }

    /// Runs `work` against the file on the blocking pool.
    ///
    /// Callers hold the lock guard across the await, so the file operation
    /// stays serialized with other mutations.
    async fn on_file<T, F>(&self, work: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&CacheFile) -> Result<T, CacheError> + Send + 'static,
    {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || work(&file)).await?
    }

    /// Live record for `id`, purging the entry when it has expired.
    pub async fn read(&self, id: &Ticker) -> Result<Option<Record>, CacheError> {
        self.read_at(id, UtcDateTime::now()).await
    }

    /// [`read`](Self::read) evaluated at an explicit instant.
    pub async fn read_at(
        &self,
        id: &Ticker,
        now: UtcDateTime,
    ) -> Result<Option<Record>, CacheError> {
        let ttl = self.ttl;
        {
            let _shared = self.lock.read().await;
            let wanted = id.clone();
            match self.on_file(move |file| file.find(&wanted)).await? {
                None => return Ok(None),
                Some(entry) if entry.is_live(now, ttl) => return Ok(Some(entry.record)),
                Some(_) => {}
            }
        }

        let _exclusive = self.lock.write().await;
        let wanted = id.clone();
        let (remaining, purged) = self
            .on_file(move |file| {
                let mut entries = file.load_compacted()?;
                let before = entries.len();
                entries.retain(|entry| entry.id != wanted || entry.is_live(now, ttl));
                let purged = entries.len() != before;
                if purged {
                    file.commit(&entries)?;
                }
                // A concurrent upsert may have written a fresh entry before the purge.
                let remaining = entries
                    .into_iter()
                    .find(|entry| entry.id == wanted)
                    .map(|entry| entry.record);
                Ok((remaining, purged))
            })
            .await?;
        if purged {
            info!(ticker = %id, "purged expired cache entry");
        }
        Ok(remaining)
    }

    /// Merge `partial` into the live entry for `id`, or start a new entry.
    ///
    /// A `Null` in `partial` never erases a value already stored. Returns the
    /// entry's creation time, which a merge never changes.
    pub async fn upsert(&self, id: &Ticker, partial: &Record) -> Result<UtcDateTime, CacheError> {
        self.upsert_at(id, partial, UtcDateTime::now()).await
    }

    /// [`upsert`](Self::upsert) evaluated at an explicit instant.
    pub async fn upsert_at(
        &self,
        id: &Ticker,
        partial: &Record,
        now: UtcDateTime,
    ) -> Result<UtcDateTime, CacheError> {
        let ttl = self.ttl;
        let fields = partial.len();
        let wanted = id.clone();
        let partial = partial.clone();

        let _exclusive = self.lock.write().await;
        let (created_at, action) = self
            .on_file(move |file| {
                let mut entries = file.load_compacted()?;
                let outcome = match entries.iter_mut().find(|entry| entry.id == wanted) {
                    Some(entry) if entry.is_live(now, ttl) => {
                        entry.record.merge_known(&partial);
                        (entry.created_at, "merged fields into cache entry")
                    }
                    Some(entry) => {
                        *entry = CacheEntry::new(wanted, now, partial);
                        (now, "replaced expired cache entry")
                    }
                    None => {
                        entries.push(CacheEntry::new(wanted, now, partial));
                        (now, "created cache entry")
                    }
                };
                file.commit(&entries)?;
                Ok(outcome)
            })
            .await?;

        debug!(ticker = %id, fields, "{action}");
        Ok(created_at)
    }

    /// Remove the entry for `id`, live or expired. Returns whether one existed.
    pub async fn clear(&self, id: &Ticker) -> Result<bool, CacheError> {
        let _exclusive = self.lock.write().await;
        let wanted = id.clone();
        let cleared = self
            .on_file(move |file| {
                let mut entries = file.load_compacted()?;
                let before = entries.len();
                entries.retain(|entry| entry.id != wanted);
                if entries.len() == before {
                    return Ok(false);
                }
                file.commit(&entries)?;
                Ok(true)
            })
            .await?;

        if cleared {
            info!(ticker = %id, "cleared cache entry");
        }
        Ok(cleared)
    }

    /// Remove the whole store.
    pub async fn delete_all(&self) -> Result<(), CacheError> {
        let _exclusive = self.lock.write().await;
        if self.on_file(CacheFile::remove).await? {
            info!(path = %self.file.path.display(), "deleted cache store");
        }
        Ok(())
    }

    /// Stored entry for `id` regardless of age.
    pub async fn peek(&self, id: &Ticker) -> Result<Option<CacheEntry>, CacheError> {
        let _shared = self.lock.read().await;
        let wanted = id.clone();
        self.on_file(move |file| file.find(&wanted)).await
    }

    /// Number of decodable entries, including expired ones.
    pub async fn len(&self) -> Result<usize, CacheError> {
        let _shared = self.lock.read().await;
        self.on_file(|file| Ok(file.load_compacted()?.len())).await
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
