//! In-memory output cache
//!
//! Every tool output (PDF, image or archive) is stored under a fresh key so a
//! later call can use it as input with `{"cache_key": ...}`.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// A cached blob and its content type
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBlob {
    pub data: Arc<Vec<u8>>,
    pub mime_type: String,
}

impl CachedBlob {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

struct Entries {
    lru: LruCache<String, CachedBlob>,
    total_bytes: usize,
}

/// LRU cache bounded by entry count and total bytes
pub struct BlobCache {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl BlobCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store `data` under a new unique key and return the key.
    ///
    /// A blob larger than the whole byte budget is not kept, but a key is still
    /// returned; resolving it later reports a missing key.
    pub fn insert(&self, data: Vec<u8>, mime_type: &str) -> String {
        let mut entries = self.entries.lock();
        let key = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if !entries.lru.contains(&candidate) {
                break candidate;
            }
        };

        let size = data.len();
        if size > self.max_bytes {
            tracing::debug!(size, max = self.max_bytes, "Blob exceeds cache budget, not cached");
            return key;
        }

        while entries.total_bytes + size > self.max_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => {
                    entries.total_bytes = entries.total_bytes.saturating_sub(evicted.len())
                }
                None => break,
            }
        }

        let blob = CachedBlob {
            data: Arc::new(data),
            mime_type: mime_type.to_string(),
        };
        if let Some((_, evicted)) = entries.lru.push(key.clone(), blob) {
            entries.total_bytes = entries.total_bytes.saturating_sub(evicted.len());
        }
        entries.total_bytes += size;
        key
    }

    pub fn get(&self, key: &str) -> Option<CachedBlob> {
        self.entries.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().lru.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<CachedBlob> {
        let mut entries = self.entries.lock();
        let blob = entries.lru.pop(key)?;
        entries.total_bytes = entries.total_bytes.saturating_sub(blob.len());
        Some(blob)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().lru.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.lock().total_bytes
    }
}
