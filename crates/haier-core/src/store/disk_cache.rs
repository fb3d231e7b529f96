// ── Write-back disk cache ──
//
// String-keyed store with an in-memory mirror (`DashMap`) in front of one
// JSON file per key. Reads are always served from memory; writes mark the
// key dirty and a flush persists every dirty key. In debounced mode the
// flush runs once per window on the tokio runtime, so a crash inside the
// window loses the unflushed writes (all cached data is re-fetchable).
//
// Safe for a single process only; there is no cross-process locking.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexSet;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::key::{escape_key, unescape_key};
use crate::error::CoreError;

const FILE_EXTENSION: &str = "json";
const FILE_SUFFIX: &str = ".json";

/// Default coalescing window for debounced writes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// How writes reach disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Coalesce writes and flush once per window.
    Debounced(Duration),
    /// Flush on every write.
    Immediate,
}

impl Default for WriteMode {
    fn default() -> Self {
        Self::Debounced(DEFAULT_DEBOUNCE)
    }
}

struct Entry<T> {
    value: Arc<T>,
    written_at: DateTime<Utc>,
}

struct CacheInner<T> {
    dir: PathBuf,
    mode: WriteMode,
    entries: DashMap<String, Entry<T>>,
    /// Keys whose disk state lags memory (set or deleted since last flush).
    dirty: Mutex<IndexSet<String>>,
    flush_scheduled: AtomicBool,
    /// Serializes flushes so two never write the same file concurrently.
    flush_lock: Mutex<()>,
}

/// Persistent key → value cache. Cheap to clone; clones share state.
pub struct DiskCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for DiskCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for DiskCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("dir", &self.inner.dir)
            .field("mode", &self.inner.mode)
            .field("len", &self.inner.entries.len())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> DiskCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open (creating if needed) the cache directory and load every
    /// readable entry into memory. Unreadable files are skipped.
    pub fn open(dir: impl Into<PathBuf>, mode: WriteMode) -> Result<Self, CoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CoreError::storage(&dir, e))?;

        let entries = DashMap::new();
        for dirent in fs::read_dir(&dir).map_err(|e| CoreError::storage(&dir, e))? {
            let path = match dirent {
                Ok(d) => d.path(),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            if let Some((key, entry)) = load_entry(&path) {
                entries.insert(key, entry);
            }
        }
        debug!(dir = %dir.display(), count = entries.len(), "cache opened");

        Ok(Self {
            inner: Arc::new(CacheInner {
                dir,
                mode,
                entries,
                dirty: Mutex::new(IndexSet::new()),
                flush_scheduled: AtomicBool::new(false),
                flush_lock: Mutex::new(()),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.inner
            .entries
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Store `value`; visible to `get` immediately, durable after the next flush.
    pub fn set(&self, key: &str, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.inner.entries.insert(
            key.to_owned(),
            Entry {
                value: Arc::clone(&value),
                written_at: Utc::now(),
            },
        );
        self.mark_dirty(key);
        value
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.entries.remove(key).is_some();
        if removed {
            self.mark_dirty(key);
        }
        removed
    }

    /// Remove every entry from memory and disk.
    pub fn clear(&self) -> Result<(), CoreError> {
        let _guard = lock(&self.inner.flush_lock);
        self.inner.entries.clear();
        lock(&self.inner.dirty).clear();

        let dir = &self.inner.dir;
        for dirent in fs::read_dir(dir).map_err(|e| CoreError::storage(dir, e))? {
            let path = dirent.map_err(|e| CoreError::storage(dir, e))?.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| CoreError::storage(&path, e))?;
            }
        }
        debug!(dir = %dir.display(), "cache cleared");
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn values(&self) -> Vec<Arc<T>> {
        self.inner
            .entries
            .iter()
            .map(|e| Arc::clone(&e.value().value))
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, Arc<T>)> {
        self.inner
            .entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.value().value)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// When `key` was last written in memory.
    pub fn written_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.inner.entries.get(key).map(|e| e.written_at)
    }

    /// Persist every dirty key now. Idempotent; safe to call while other
    /// tasks keep writing (their keys are picked up by the next flush).
    pub fn flush(&self) -> Result<(), CoreError> {
        self.inner.flush()
    }

    fn mark_dirty(&self, key: &str) {
        lock(&self.inner.dirty).insert(key.to_owned());
        self.schedule_flush();
    }

    fn schedule_flush(&self) {
        let delay = match self.inner.mode {
            WriteMode::Immediate => {
                self.inner.flush_logged();
                return;
            }
            WriteMode::Debounced(delay) => delay,
        };

        if self.inner.flush_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // Outside a runtime there is nothing to defer to.
            self.inner.flush_scheduled.store(false, Ordering::Release);
            self.inner.flush_logged();
            return;
        };

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush_scheduled.store(false, Ordering::Release);
            if let Err(e) = tokio::task::spawn_blocking(move || inner.flush_logged()).await {
                warn!(error = %e, "cache flush task failed");
            }
        });
    }
}

impl<T: Clone> DiskCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Apply `f` to a copy of the cached value and store the result.
    ///
    /// Returns the updated value, or `None` if `key` is not cached.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut T)) -> Option<Arc<T>> {
        let updated = {
            let mut entry = self.inner.entries.get_mut(key)?;
            let mut value = T::clone(&entry.value);
            f(&mut value);
            entry.value = Arc::new(value);
            entry.written_at = Utc::now();
            Arc::clone(&entry.value)
        };
        self.mark_dirty(key);
        Some(updated)
    }
}

impl<T> CacheInner<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{FILE_EXTENSION}", escape_key(key)))
    }

    fn flush_logged(&self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "cache flush failed");
        }
    }

    fn flush(&self) -> Result<(), CoreError> {
        let _guard = lock(&self.flush_lock);
        let pending: Vec<String> = lock(&self.dirty).drain(..).collect();
        if pending.is_empty() {
            return Ok(());
        }

        let mut first_error = None;
        for key in &pending {
            let result = match self.entries.get(key).map(|e| Arc::clone(&e.value)) {
                Some(value) => self.write_file(key, &value),
                None => self.remove_file(key),
            };
            if let Err(e) = result {
                warn!(key, error = %e, "failed to persist cache entry");
                lock(&self.dirty).insert(key.clone());
                first_error.get_or_insert(e);
            }
        }
        debug!(count = pending.len(), "cache flushed");

        first_error.map_or(Ok(()), Err)
    }

    fn write_file(&self, key: &str, value: &T) -> Result<(), CoreError> {
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| CoreError::storage(&path, io::Error::other(e)))?;
        let tmp = path.with_extension(format!("{FILE_EXTENSION}.tmp"));
        fs::write(&tmp, json).map_err(|e| CoreError::storage(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| CoreError::storage(&path, e))
    }

    fn remove_file(&self, key: &str) -> Result<(), CoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::storage(&path, e)),
        }
    }
}

fn load_entry<T: DeserializeOwned>(path: &Path) -> Option<(String, Entry<T>)> {
    // `Path::file_stem` treats `.json` (the empty key) as a stem with no
    // extension, so strip the suffix by hand.
    let stem = path
        .file_name()?
        .to_str()?
        .strip_suffix(FILE_SUFFIX)?;
    let key = unescape_key(stem)?;
    let raw = fs::read(path)
        .inspect_err(|e| warn!(path = %path.display(), error = %e, "cannot read cache file"))
        .ok()?;
    let value = serde_json::from_slice(&raw)
        .inspect_err(|e| warn!(path = %path.display(), error = %e, "ignoring corrupt cache file"))
        .ok()?;
    let written_at = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    Some((
        key,
        Entry {
            value: Arc::new(value),
            written_at,
        },
    ))
}
