//! Byte caches for source images and rendered derivatives.
//!
//! Decoding and re-encoding is the expensive part of serving an image
//! request. Two independent caches let the [service](crate::service) skip
//! work: one holds original source bytes, the other holds finished
//! derivatives keyed by their canonical IIIF URI.
//!
//! # Design
//!
//! ## Cache keys
//!
//! Keys are arbitrary strings (identifiers or canonical URIs). The
//! [`DiskCache`] never uses a key as a path: it stores each entry under the
//! SHA-256 of the key, sharded by the first two hex characters:
//!
//! ```text
//! <root>/3f/3fa4…e1
//! ```
//!
//! so URIs containing `/`, `%` or `!` are safe and no directory grows
//! unbounded. Writes go to a temporary file that is renamed into place, so
//! concurrent writers of the same key leave one complete entry behind (last
//! write wins) and readers never see a partial file.
//!
//! ## Population
//!
//! Requests never wait on a cache write. [`CacheWriter`] owns one worker
//! thread fed through a bounded channel:
//!
//! - queue full: the write is dropped and a warning is logged
//! - store failure: logged at warn level and dropped
//! - shutdown (explicit or on drop): pending writes drain before the
//!   worker exits
//!
//! Nothing about cache population is ever reported to the request path.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Storage backend selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    None,
    Memory,
    Disk,
}

/// A key/value store for encoded image bytes.
pub trait Cache: Send + Sync {
    /// Cached bytes for `key`, if present. Read failures count as misses.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn set(&self, key: &str, body: &[u8]) -> Result<(), CacheError>;

    /// Whether `set` keeps anything. Callers skip population when it doesn't.
    fn stores(&self) -> bool {
        true
    }
}

/// SHA-256 of a cache key, returned as a hex string.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl Cache for NullCache {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _body: &[u8]) -> Result<(), CacheError> {
        Ok(())
    }

    fn stores(&self) -> bool {
        false
    }
}

/// In-process cache that evicts the oldest insertion once full.
#[derive(Debug)]
pub struct MemoryCache {
    max_entries: usize,
    inner: Mutex<MemoryEntries>,
}

#[derive(Debug, Default)]
struct MemoryEntries {
    entries: HashMap<String, Vec<u8>>,
    order: VecDeque<String>,
}

impl MemoryCache {
    /// A `max_entries` of zero is treated as one.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(MemoryEntries::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().ok()?.entries.get(key).cloned()
    }

    fn set(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        if inner.entries.insert(key.to_string(), body.to_vec()).is_none() {
            inner.order.push_back(key.to_string());
        }
        while inner.entries.len() > self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        Ok(())
    }
}

/// Content-addressed files below a root directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

/// Distinguishes temp files written concurrently by one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the entry for `key` lives (whether or not it exists).
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let hash = hash_key(key);
        self.root.join(&hash[..2]).join(hash)
    }
}

impl Cache for DiskCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.entry_path(key)).ok()
    }

    fn set(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        let Some(dir) = path.parent() else {
            return Err(io::Error::other("cache entry has no parent directory").into());
        };
        fs::create_dir_all(dir)?;

        let tmp = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, body)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Build the cache a configuration names.
pub fn build_cache(kind: CacheKind, root: &Path, max_entries: usize) -> Arc<dyn Cache> {
    match kind {
        CacheKind::None => Arc::new(NullCache),
        CacheKind::Memory => Arc::new(MemoryCache::new(max_entries)),
        CacheKind::Disk => Arc::new(DiskCache::new(root)),
    }
}

struct WriteJob {
    key: String,
    body: Vec<u8>,
}

/// Asynchronous, bounded cache population.
///
/// See the [module docs](self) for the drop policy.
pub struct CacheWriter {
    name: &'static str,
    sender: Mutex<Option<SyncSender<WriteJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CacheWriter {
    /// Spawn the worker thread. `capacity` is the number of queued writes
    /// accepted before new ones are dropped (minimum one).
    pub fn spawn(name: &'static str, cache: Arc<dyn Cache>, capacity: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<WriteJob>(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name(format!("cache-{name}"))
            .spawn(move || {
                for job in receiver {
                    match cache.set(&job.key, &job.body) {
                        Ok(()) => tracing::trace!(cache = name, key = %job.key, "stored"),
                        Err(e) => {
                            tracing::warn!(cache = name, key = %job.key, error = %e, "cache store failed")
                        }
                    }
                }
            })?;

        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a write. Returns whether it was accepted.
    pub fn enqueue(&self, key: &str, body: Vec<u8>) -> bool {
        let Ok(guard) = self.sender.lock() else {
            return false;
        };
        let Some(sender) = guard.as_ref() else {
            tracing::debug!(cache = self.name, key, "writer shut down, dropping write");
            return false;
        };

        let job = WriteJob {
            key: key.to_string(),
            body,
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(cache = self.name, key = %job.key, "cache queue full, dropping write");
                false
            }
            Err(TrySendError::Disconnected(job)) => {
                tracing::warn!(cache = self.name, key = %job.key, "cache worker gone, dropping write");
                false
            }
        }
    }

    /// Stop accepting writes and wait for queued ones to finish.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker
            && worker.join().is_err()
        {
            tracing::warn!(cache = self.name, "cache worker panicked");
        }
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
