//! Backing stores for cached responses

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam_skiplist::SkipMap;
use http::{HeaderMap, StatusCode};
use ring::digest;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::Instant;

use super::cache_entry::CacheItem;
use crate::http::ResponseData;

/// Storage seam under [`CacheManager`](super::CacheManager).
///
/// Stores hold entries verbatim; expiry, cacheability and eviction are
/// decided by the manager. Implementations must be safe to call from many
/// tasks at once.
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Option<CacheItem>;

    fn set(&self, key: &str, item: CacheItem);

    fn remove(&self, key: &str) -> Option<CacheItem>;

    fn clear(&self);

    /// Visit every entry without cloning it.
    fn for_each(&self, visit: &mut dyn FnMut(&str, &CacheItem));

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        self.for_each(&mut |key, _| keys.push(key.to_string()));
        keys
    }

    /// Sum of entry sizes in bytes.
    fn total_size(&self) -> u64 {
        let mut total = 0;
        self.for_each(&mut |_, item| total += item.size);
        total
    }
}

/// Lock-free in-memory store on a crossbeam skiplist.
#[derive(Default)]
pub struct MemoryStore {
    entries: SkipMap<String, CacheItem>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Option<CacheItem> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, item: CacheItem) {
        self.entries.insert(key.to_string(), item);
    }

    fn remove(&self, key: &str) -> Option<CacheItem> {
        self.entries.remove(key).map(|entry| entry.value().clone())
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn for_each(&self, visit: &mut dyn FnMut(&str, &CacheItem)) {
        for entry in &self.entries {
            visit(entry.key(), entry.value());
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// On-disk form of one entry: `{ key, data, timestamp, ttl, tags }`.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    data: StoredResponse,
    timestamp: DateTime<Utc>,
    /// Milliseconds
    ttl: u64,
    #[serde(default)]
    tags: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredResponse {
    status: u16,
    status_text: String,
    #[serde(with = "crate::config::serde_headers")]
    headers: HeaderMap,
    /// Base64 body
    body: String,
}

/// Write-through persistent store.
///
/// Entries live in memory and are mirrored as one JSON envelope per key in
/// `dir`, under the namespaced key `"<namespace>:<key>"`. Opening a store
/// loads every unexpired envelope written by an earlier process.
///
/// Disk writes happen synchronously inside `set` and `remove`. On a
/// multi-threaded tokio runtime they run under
/// [`block_in_place`](tokio::task::block_in_place) so other tasks move off the
/// blocked worker; elsewhere, including current-thread runtimes, they block
/// the caller.
pub struct FileStore {
    dir: PathBuf,
    namespace: String,
    index: MemoryStore,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, namespace: impl Into<String>) -> io::Result<Self> {
        let store = Self {
            dir: dir.into(),
            namespace: namespace.into(),
            index: MemoryStore::new(),
        };
        fs::create_dir_all(&store.dir)?;
        store.load()?;
        Ok(store)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = digest::digest(&digest::SHA256, self.namespaced(key).as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest.as_ref())))
    }

    fn load(&self) -> io::Result<()> {
        let prefix = format!("{}:", self.namespace);
        let mut loaded = 0usize;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let envelope = match fs::read(&path)
                .ok()
                .and_then(|raw| serde_json::from_slice::<Envelope>(&raw).ok())
            {
                Some(envelope) => envelope,
                None => {
                    tracing::warn!(
                        target: "reqflow::cache::store",
                        path = %path.display(),
                        "Skipping unreadable cache envelope"
                    );
                    continue;
                }
            };

            let Some(key) = envelope.key.strip_prefix(&prefix).map(str::to_string) else {
                continue;
            };

            match Self::decode(envelope) {
                Some(item) if !item.is_expired() => {
                    self.index.set(&key, item);
                    loaded += 1;
                }
                _ => {
                    let _ = fs::remove_file(&path);
                }
            }
        }

        tracing::debug!(
            target: "reqflow::cache::store",
            dir = %self.dir.display(),
            entries = loaded,
            "Loaded persisted cache entries"
        );
        Ok(())
    }

    fn encode(&self, key: &str, item: &CacheItem) -> Envelope {
        let response = &item.response;
        Envelope {
            key: self.namespaced(key),
            data: StoredResponse {
                status: response.status().as_u16(),
                status_text: response.status_text().to_string(),
                headers: response.headers().clone(),
                body: BASE64.encode(response.data()),
            },
            timestamp: item.timestamp,
            ttl: u64::try_from(item.ttl.as_millis()).unwrap_or(u64::MAX),
            tags: item.tags.clone(),
        }
    }

    /// Rebuild an item; monotonic instants are derived from the wall-clock age.
    fn decode(envelope: Envelope) -> Option<CacheItem> {
        let status = StatusCode::from_u16(envelope.data.status).ok()?;
        let body = BASE64.decode(envelope.data.body.as_bytes()).ok()?;
        let response = ResponseData::new(status, envelope.data.headers, Bytes::from(body))
            .with_status_text(envelope.data.status_text);

        let age = (Utc::now() - envelope.timestamp).to_std().unwrap_or(Duration::ZERO);
        let now = Instant::now();
        let created_at = now.checked_sub(age)?;

        let mut item = CacheItem::new(response, Duration::from_millis(envelope.ttl), envelope.tags);
        item.timestamp = envelope.timestamp;
        item.created_at = created_at;
        item.last_accessed = created_at;
        Some(item)
    }

    fn write(&self, key: &str, item: &CacheItem) -> io::Result<()> {
        let envelope = self.encode(key, item);
        let raw = serde_json::to_vec(&envelope).map_err(io::Error::other)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        blocking_io(|| {
            fs::write(&tmp, raw)?;
            fs::rename(&tmp, &path)
        })
    }
}

impl CacheStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> Option<CacheItem> {
        self.index.get(key)
    }

    fn set(&self, key: &str, item: CacheItem) {
        // Access bookkeeping does not change the envelope.
        let unchanged = self
            .index
            .get(key)
            .is_some_and(|prev| prev.timestamp == item.timestamp && prev.ttl == item.ttl);
        if !unchanged {
            if let Err(e) = self.write(key, &item) {
                tracing::warn!(
                    target: "reqflow::cache::store",
                    key = key,
                    error = %e,
                    "Failed to persist cache entry; keeping it in memory only"
                );
            }
        }
        self.index.set(key, item);
    }

    fn remove(&self, key: &str) -> Option<CacheItem> {
        let removed = self.index.remove(key);
        let path = self.path_for(key);
        if let Err(e) = blocking_io(|| fs::remove_file(&path)) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    target: "reqflow::cache::store",
                    key = key,
                    error = %e,
                    "Failed to delete persisted cache entry"
                );
            }
        }
        removed
    }

    fn clear(&self) {
        for key in self.index.keys() {
            self.remove(&key);
        }
    }

    fn for_each(&self, visit: &mut dyn FnMut(&str, &CacheItem)) {
        self.index.for_each(visit);
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Run filesystem work, yielding the worker on multi-threaded runtimes.
fn blocking_io<R>(op: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(op)
        }
        _ => op(),
    }
}
