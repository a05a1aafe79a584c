//! In-memory LRU image cache implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{Bitmap, CacheKey, TargetSize};
use crate::domain::errors::CacheResult;
use crate::domain::ports::{CacheEntry, ImageCachePort};

use super::stats::CacheStats;

/// Default share of the heap budget given to decoded bitmaps (1/8).
pub const DEFAULT_HEAP_DIVISOR: u64 = 8;

struct Inner {
    entries: LruCache<CacheKey, Arc<Bitmap>>,
    size: u64,
}

/// In-memory LRU cache for decoded images, bounded by decoded byte size.
///
/// Uses a plain mutex so lookups can run on the UI thread; no I/O happens
/// while it is held.
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `capacity` decoded bytes.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size: 0,
            }),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache sized to `heap_budget / divisor`.
    #[must_use]
    pub fn with_heap_budget(heap_budget: u64, divisor: u64) -> Self {
        Self::new(heap_budget / divisor.max(1))
    }

    /// Returns the bitmap for `key`, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        let mut inner = self.inner.lock();
        if let Some(bitmap) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(bitmap.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Like [`Self::get`], but a miss is not counted.
    ///
    /// For fast paths whose misses go on to a full lookup that does the counting.
    pub fn get_if_cached(&self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        let bitmap = self.inner.lock().entries.get(key).cloned()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "Memory cache hit");
        Some(bitmap)
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Inserts `bitmap` unless `key` is already cached; the first writer wins.
    ///
    /// Returns true if the bitmap was inserted. An existing entry is promoted
    /// instead of replaced.
    pub fn insert(&self, key: &CacheKey, bitmap: Arc<Bitmap>) -> bool {
        let mut inner = self.inner.lock();
        if inner.entries.get(key).is_some() {
            trace!(key = %key, "Memory cache already holds key");
            return false;
        }

        let size = bitmap.byte_size();
        inner.entries.put(key.clone(), bitmap);
        inner.size += size;
        debug!(key = %key, size, total = inner.size, "Stored image in memory cache");

        while inner.size > self.capacity {
            let Some((evicted, old)) = inner.entries.pop_lru() else {
                break;
            };
            inner.size -= old.byte_size();
            debug!(key = %evicted, size = old.byte_size(), "Evicted image from memory cache");
        }
        true
    }

    /// Removes `key` from the cache.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<Bitmap>> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key)?;
        inner.size -= removed.byte_size();
        Some(removed)
    }

    /// Clears all images from the cache.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size = 0;
        debug!("Cleared memory image cache");
    }

    /// Number of cached bitmaps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded bytes currently resident.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Byte budget.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats::new(
            "memory",
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            inner.entries.len(),
            inner.size,
        )
    }
}

#[async_trait::async_trait]
impl ImageCachePort for MemoryImageCache {
    async fn get(&self, key: &CacheKey, _target: TargetSize) -> Option<Arc<Bitmap>> {
        Self::get(self, key)
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> CacheResult<()> {
        if let CacheEntry::Decoded(bitmap) = entry {
            self.insert(key, bitmap);
        }
        Ok(())
    }

    async fn read_back(&self, key: &CacheKey, _target: TargetSize) -> Option<Arc<Bitmap>> {
        self.peek(key)
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn tier(&self) -> &'static str {
        "memory"
    }
}
