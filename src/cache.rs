use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use moka::Expiry;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::Builder;
use tracing::warn;

use crate::error::MigrateError;

pub const CACHE_PREFIX: &str = "pokemon_api:";
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MEMORY_CACHE_CAPACITY: u64 = 10_000;

/// Stable cache id for a fully-resolved request URL.
pub fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{CACHE_PREFIX}{}", hex::encode(digest))
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Key-value store for fetched documents. Expired entries must read as absent.
/// Backends swallow their own failures: a broken backend is a permanent miss.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, document: Value, ttl: Duration);
}

impl<T: CacheBackend + ?Sized> CacheBackend for Arc<T> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &str, document: Value, ttl: Duration) {
        (**self).set(key, document, ttl)
    }
}

impl<T: CacheBackend + ?Sized> CacheBackend for Box<T> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&self, key: &str, document: Value, ttl: Duration) {
        (**self).set(key, document, ttl)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Value, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { data, expires_at }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone)]
struct TimedDocument {
    data: Value,
    ttl: Duration,
}

/// Per-entry expiry so every `set` keeps its own TTL.
struct DocumentExpiry;

impl Expiry<String, TimedDocument> for DocumentExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &TimedDocument,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &TimedDocument,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-wide in-memory cache. Expired entries are evicted by moka.
pub struct MemoryCache {
    entries: Cache<String, TimedDocument>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_CACHE_CAPACITY)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(DocumentExpiry)
            .build();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.data)
    }

    fn set(&self, key: &str, document: Value, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            TimedDocument {
                data: document,
                ttl,
            },
        );
    }
}

/// Backend that stores nothing, so every fetch goes to the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheBackend for NoCache {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn set(&self, _key: &str, _document: Value, _ttl: Duration) {}
}

/// One JSON file per key under `root`, so cached documents survive between runs.
pub struct FileCache<C: Clock = SystemClock> {
    root: Utf8PathBuf,
    clock: C,
}

impl FileCache<SystemClock> {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self::with_clock(root, SystemClock)
    }

    pub fn default_root() -> Result<Utf8PathBuf, MigrateError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("pokemon-migrate"))
                    .ok()
            })
            .ok_or_else(|| {
                MigrateError::Filesystem("unable to resolve cache directory".to_string())
            })
    }
}

impl<C: Clock> FileCache<C> {
    pub fn with_clock(root: Utf8PathBuf, clock: C) -> Self {
        Self { root, clock }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn entry_path(&self, key: &str) -> Utf8PathBuf {
        let name = key.strip_prefix(CACHE_PREFIX).unwrap_or(key);
        self.root.join(format!("{name}.json"))
    }

    fn read_entry(&self, path: &Utf8Path) -> Result<Option<CacheEntry>, MigrateError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let entry = serde_json::from_str(&content)
            .map_err(|err| MigrateError::Filesystem(format!("corrupt cache entry {path}: {err}")))?;
        Ok(Some(entry))
    }

    fn write_entry(&self, path: &Utf8Path, entry: &CacheEntry) -> Result<(), MigrateError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let content =
            serde_json::to_vec(entry).map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("pokemon-migrate-cache")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl<C: Clock> CacheBackend for FileCache<C> {
    fn get(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key);
        match self.read_entry(&path) {
            Ok(Some(entry)) if entry.is_fresh(self.clock.now()) => Some(entry.data),
            Ok(Some(_)) => {
                let _ = fs::remove_file(path.as_std_path());
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(%err, key, "cache read failed; treating as miss");
                None
            }
        }
    }

    fn set(&self, key: &str, document: Value, ttl: Duration) {
        let entry = CacheEntry::new(document, self.clock.now(), ttl);
        let path = self.entry_path(key);
        if let Err(err) = self.write_entry(&path, &entry) {
            warn!(%err, key, "cache write failed; entry dropped");
        }
    }
}
