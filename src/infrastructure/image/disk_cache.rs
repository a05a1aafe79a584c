//! Disk-based image cache for persistence across sessions.
//!
//! Stores encoded bodies exactly as fetched, one file per key, with a
//! journal tracking commits and recency. Writes are staged next to the final
//! file and renamed into place only once the whole body arrived.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use lru::LruCache;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::domain::entities::{Bitmap, CacheKey, TargetSize};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ByteStream, CacheEntry, DecodeSource, ImageCachePort, ResizerPort};
use crate::infrastructure::system::usable_space;

use super::disk_journal::{self, Journal, JournalRecord};
use super::stats::CacheStats;
use super::ui_context::assert_off_ui_thread;

/// Maximum disk cache size in bytes (50 MiB default).
pub const DEFAULT_DISK_CACHE_SIZE: u64 = 50 * 1024 * 1024;

/// Subdirectory of the platform cache dir holding entries.
pub const CACHE_DIR_NAME: &str = "bitmap";

const IO_BUFFER_SIZE: usize = 8 * 1024;
const ENTRY_EXT: &str = "img";
const STAGING_EXT: &str = "tmp";

struct DiskState {
    entries: LruCache<CacheKey, u64>,
    size: u64,
    editing: HashSet<CacheKey>,
    journal: Journal,
}

impl DiskState {
    async fn record(&mut self, record: JournalRecord) -> CacheResult<()> {
        self.journal.append(&record).await?;
        if self.journal.needs_compaction(self.entries.len()) {
            let dir = self.journal.dir().to_path_buf();
            self.journal = Journal::rebuild(&dir, &self.entries, &self.editing).await?;
        }
        Ok(())
    }
}

/// Disk-based image cache that persists encoded image bytes.
///
/// A cache whose directory could not be prepared is disabled: reads miss and
/// writes are accepted and discarded.
pub struct DiskImageCache {
    dir: PathBuf,
    max_size: u64,
    resizer: Arc<dyn ResizerPort>,
    state: Option<Mutex<DiskState>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskImageCache {
    /// Opens the cache in `dir`, bounded to `max_size` bytes.
    ///
    /// Never fails: any initialisation problem, including less free space
    /// than `max_size`, is logged and leaves the tier disabled.
    pub async fn open(dir: PathBuf, max_size: u64, resizer: Arc<dyn ResizerPort>) -> Self {
        let state = match Self::init(&dir, max_size).await {
            Ok(state) => {
                info!(
                    dir = %dir.display(),
                    entries = state.entries.len(),
                    size = state.size,
                    max_size,
                    "Disk cache ready"
                );
                Some(Mutex::new(state))
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Disk cache disabled");
                None
            }
        };
        Self {
            dir,
            max_size,
            resizer,
            state,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a tier that is switched off: reads miss, writes are discarded.
    #[must_use]
    pub fn disabled(dir: PathBuf, max_size: u64, resizer: Arc<dyn ResizerPort>) -> Self {
        debug!(dir = %dir.display(), "Disk cache switched off");
        Self {
            dir,
            max_size,
            resizer,
            state: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn init(dir: &Path, max_size: u64) -> CacheResult<DiskState> {
        fs::create_dir_all(dir).await.map_err(|e| {
            CacheError::DiskUnavailable(format!("failed to create {}: {e}", dir.display()))
        })?;

        let usable = usable_space(dir).map_err(|e| {
            CacheError::DiskUnavailable(format!("failed to query free space: {e}"))
        })?;
        if usable <= max_size {
            return Err(CacheError::DiskUnavailable(format!(
                "{usable} bytes free, need more than {max_size}"
            )));
        }

        let replay = disk_journal::replay(dir).await?.unwrap_or_default();
        let mut entries = replay.entries;

        for key in &replay.dirty {
            entries.pop(key);
            remove_if_exists(&entry_path(dir, key)).await;
        }

        // Staging leftovers and files the journal does not know about.
        let mut listing = fs::read_dir(dir)
            .await
            .map_err(|e| CacheError::io("failed to read cache dir", &e))?;
        loop {
            let item = match listing.next_entry().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Stopped scanning cache dir");
                    break;
                }
            };
            let path = item.path();
            let stem_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(CacheKey::from_hex);
            let orphan = match path.extension().and_then(|e| e.to_str()) {
                Some(STAGING_EXT) => true,
                Some(ENTRY_EXT) => stem_key.is_none_or(|k| !entries.contains(&k)),
                _ => false,
            };
            if orphan {
                trace!(path = %path.display(), "Removing orphaned cache file");
                remove_if_exists(&path).await;
            }
        }

        // Entries whose file vanished, sized by what is actually on disk.
        let mut size = 0u64;
        let keys: Vec<CacheKey> = entries.iter().map(|(k, _)| k.clone()).collect();
        for key in keys {
            match fs::metadata(entry_path(dir, &key)).await {
                Ok(meta) => {
                    if let Some(recorded) = entries.peek_mut(&key) {
                        *recorded = meta.len();
                    }
                    size += meta.len();
                }
                Err(_) => {
                    entries.pop(&key);
                }
            }
        }

        let journal = Journal::rebuild(dir, &entries, &HashSet::new()).await?;
        let mut state = DiskState {
            entries,
            size,
            editing: HashSet::new(),
            journal,
        };
        trim(dir, max_size, &mut state).await;
        Ok(state)
    }

    /// Returns true if the tier initialised and accepts writes.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Byte budget.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Loads and decodes the entry for `key` to cover `target`.
    ///
    /// An entry that fails to decode is dropped from the cache.
    ///
    /// # Panics
    /// When called on the UI thread.
    pub async fn get(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>> {
        self.read(key, target, true).await
    }

    /// Same as [`Self::get`] without touching the hit and miss counters.
    ///
    /// # Panics
    /// When called on the UI thread.
    pub async fn read_back(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>> {
        self.read(key, target, false).await
    }

    async fn read(
        &self,
        key: &CacheKey,
        target: TargetSize,
        counted: bool,
    ) -> Option<Arc<Bitmap>> {
        assert_off_ui_thread("disk cache read");
        let state = self.state.as_ref()?;
        let count = |counter: &AtomicU64| {
            if counted {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        };

        let file = {
            let mut st = state.lock().await;
            if st.entries.get(key).is_none() {
                count(&self.misses);
                trace!(key = %key, "Disk cache miss");
                return None;
            }
            match fs::File::open(entry_path(&self.dir, key)).await {
                Ok(file) => {
                    if let Err(e) = st.record(JournalRecord::Read(key.clone())).await {
                        warn!(key = %key, error = %e, "Failed to record read");
                    }
                    file.into_std().await
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache entry unreadable, dropping it");
                    if let Some(size) = st.entries.pop(key) {
                        st.size -= size;
                    }
                    if let Err(e) = st.record(JournalRecord::Remove(key.clone())).await {
                        warn!(key = %key, error = %e, "Failed to record removal");
                    }
                    count(&self.misses);
                    return None;
                }
            }
        };
        count(&self.hits);
        trace!(key = %key, "Disk cache hit");

        let resizer = self.resizer.clone();
        let result =
            tokio::task::spawn_blocking(move || resizer.decode(DecodeSource::File(file), target))
                .await;

        match result {
            Ok(Ok(bitmap)) => {
                debug!(key = %key, sample_size = bitmap.sample_size(), "Decoded image from disk cache");
                Some(Arc::new(bitmap))
            }
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to decode cached image");
                self.remove(key).await;
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "Decode task panicked");
                None
            }
        }
    }

    /// Streams `body` into the entry for `key` and returns the committed size.
    ///
    /// The previous entry, if any, stays readable until the new body is
    /// complete. A disabled tier discards the body and returns 0.
    ///
    /// # Errors
    /// `EditInProgress` if another write to `key` is open, `PartialWrite` if
    /// the body failed midway (the entry is then left as it was), or an I/O
    /// error from opening the journal record or the final rename.
    ///
    /// # Panics
    /// When called on the UI thread.
    pub async fn put_stream(&self, key: &CacheKey, mut body: ByteStream) -> CacheResult<u64> {
        assert_off_ui_thread("disk cache write");
        let Some(state) = self.state.as_ref() else {
            return Ok(0);
        };

        {
            let mut st = state.lock().await;
            if !st.editing.insert(key.clone()) {
                return Err(CacheError::EditInProgress(key.to_string()));
            }
            if let Err(e) = st.record(JournalRecord::Dirty(key.clone())).await {
                st.editing.remove(key);
                return Err(e);
            }
        }

        let staging = staging_path(&self.dir, key);
        let staged = stage(&staging, &mut body).await;
        drop(body);

        let mut st = state.lock().await;
        st.editing.remove(key);

        let committed = match staged {
            Ok(size) => fs::rename(&staging, entry_path(&self.dir, key))
                .await
                .map(|()| size)
                .map_err(|e| CacheError::io("failed to commit cache entry", &e)),
            Err(e) => Err(CacheError::PartialWrite(format!("{key}: {e}"))),
        };

        match committed {
            Ok(size) => {
                if let Some(old) = st.entries.put(key.clone(), size) {
                    st.size -= old;
                }
                st.size += size;
                // The file is in place; an unrecorded commit only costs the
                // entry on the next open.
                if let Err(e) = st.record(JournalRecord::Clean(key.clone(), size)).await {
                    warn!(key = %key, error = %e, "Failed to record commit");
                }
                debug!(key = %key, size, total = st.size, "Stored image in disk cache");
                trim(&self.dir, self.max_size, &mut st).await;
                Ok(size)
            }
            Err(e) => {
                remove_if_exists(&staging).await;
                // Re-commit the untouched previous entry, or forget the key.
                let restore = match st.entries.peek(key) {
                    Some(&old) => JournalRecord::Clean(key.clone(), old),
                    None => JournalRecord::Remove(key.clone()),
                };
                if let Err(journal_err) = st.record(restore).await {
                    warn!(key = %key, error = %journal_err, "Failed to record aborted write");
                }
                warn!(key = %key, error = %e, "Aborted disk cache write");
                Err(e)
            }
        }
    }

    /// Stores an in-memory body.
    ///
    /// # Errors
    /// Same as [`Self::put_stream`].
    pub async fn put_bytes(&self, key: &CacheKey, bytes: bytes::Bytes) -> CacheResult<u64> {
        let body: ByteStream = futures_util::stream::once(async move { Ok(bytes) }).boxed();
        self.put_stream(key, body).await
    }

    /// Removes the entry for `key`. Returns true if it existed.
    pub async fn remove(&self, key: &CacheKey) -> bool {
        assert_off_ui_thread("disk cache remove");
        let Some(state) = self.state.as_ref() else {
            return false;
        };
        let mut st = state.lock().await;
        let Some(size) = st.entries.pop(key) else {
            return false;
        };
        st.size -= size;
        remove_if_exists(&entry_path(&self.dir, key)).await;
        if let Err(e) = st.record(JournalRecord::Remove(key.clone())).await {
            warn!(key = %key, error = %e, "Failed to record removal");
        }
        debug!(key = %key, "Removed image from disk cache");
        true
    }

    /// Deletes every committed entry.
    ///
    /// # Errors
    /// Returns an I/O error if the journal cannot be rewritten.
    pub async fn clear(&self) -> CacheResult<()> {
        assert_off_ui_thread("disk cache clear");
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };
        let mut st = state.lock().await;
        while let Some((key, _)) = st.entries.pop_lru() {
            remove_if_exists(&entry_path(&self.dir, &key)).await;
        }
        st.size = 0;
        st.journal = Journal::rebuild(&self.dir, &st.entries, &st.editing).await?;
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns true if `key` has a committed entry.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        match self.state.as_ref() {
            Some(state) => state.lock().await.entries.contains(key),
            None => false,
        }
    }

    /// Returns the number of committed entries.
    pub async fn len(&self) -> usize {
        match self.state.as_ref() {
            Some(state) => state.lock().await.entries.len(),
            None => 0,
        }
    }

    /// Returns true if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the bytes currently committed.
    pub async fn size(&self) -> u64 {
        match self.state.as_ref() {
            Some(state) => state.lock().await.size,
            None => 0,
        }
    }

    /// Returns cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let (entries, bytes) = match self.state.as_ref() {
            Some(state) => {
                let st = state.lock().await;
                (st.entries.len(), st.size)
            }
            None => (0, 0),
        };
        CacheStats::new(
            "disk",
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            entries,
            bytes,
        )
    }
}

#[async_trait::async_trait]
impl ImageCachePort for DiskImageCache {
    async fn get(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>> {
        Self::get(self, key, target).await
    }

    async fn read_back(&self, key: &CacheKey, target: TargetSize) -> Option<Arc<Bitmap>> {
        Self::read_back(self, key, target).await
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> CacheResult<()> {
        match entry {
            CacheEntry::Encoded(body) => self.put_stream(key, body).await.map(|_| ()),
            CacheEntry::Decoded(_) => Ok(()),
        }
    }

    fn is_persistent(&self) -> bool {
        self.is_enabled()
    }

    fn tier(&self) -> &'static str {
        "disk"
    }
}

fn entry_path(dir: &Path, key: &CacheKey) -> PathBuf {
    dir.join(format!("{key}.{ENTRY_EXT}"))
}

fn staging_path(dir: &Path, key: &CacheKey) -> PathBuf {
    dir.join(format!("{key}.{STAGING_EXT}"))
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove cache file");
    }
}

async fn stage(path: &Path, body: &mut ByteStream) -> CacheResult<u64> {
    let file = fs::File::create(path)
        .await
        .map_err(|e| CacheError::io("failed to create staging file", &e))?;
    let mut writer = BufWriter::with_capacity(IO_BUFFER_SIZE, file);
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| CacheError::io("failed to write staging file", &e))?;
        written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| CacheError::io("failed to flush staging file", &e))?;
    Ok(written)
}

async fn trim(dir: &Path, max_size: u64, st: &mut DiskState) {
    while st.size > max_size {
        let Some((key, size)) = st.entries.pop_lru() else {
            break;
        };
        st.size -= size;
        remove_if_exists(&entry_path(dir, &key)).await;
        if let Err(e) = st.record(JournalRecord::Remove(key.clone())).await {
            warn!(key = %key, error = %e, "Failed to record eviction");
        }
        debug!(key = %key, size, "Evicted image from disk cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::disk_journal::JOURNAL_FILE;
    use crate::infrastructure::image::downsampler::Downsampler;
    use crate::infrastructure::image::ui_context::UiContext;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn png(width: u32, height: u32) -> Bytes {
        let mut buf = Vec::new();
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode png");
        Bytes::from(buf)
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_url(&format!("https://example.com/{name}.jpg"))
    }

    async fn open(dir: &Path, max_size: u64) -> DiskImageCache {
        DiskImageCache::open(dir.to_path_buf(), max_size, Arc::new(Downsampler::new())).await
    }

    #[tokio::test]
    async fn test_put_and_get_decodes_at_target() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        assert!(cache.is_enabled());
        let id = key("a");

        let size = cache.put_bytes(&id, png(480, 600)).await.expect("put");
        assert!(size > 0);
        assert_eq!(cache.size().await, size);

        let bitmap = cache
            .get(&id, TargetSize::new(120, 150))
            .await
            .expect("hit");
        assert_eq!(bitmap.sample_size(), 2);
        assert_eq!((bitmap.width(), bitmap.height()), (240, 300));
        assert!(entry_path(temp.path(), &id).exists());
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        assert!(cache.get(&key("none"), TargetSize::original()).await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_read_back_leaves_counters_alone() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        let id = key("stored");
        cache.put_bytes(&id, png(8, 8)).await.expect("put");

        assert!(cache.read_back(&id, TargetSize::original()).await.is_some());
        assert!(cache.read_back(&key("absent"), TargetSize::original()).await.is_none());
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp = TempDir::new().expect("tempdir");
        let id = key("persist");
        {
            let cache = open(temp.path(), 1024 * 1024).await;
            cache.put_bytes(&id, png(8, 8)).await.expect("put");
        }

        let cache = open(temp.path(), 1024 * 1024).await;
        assert!(cache.contains(&id).await);
        assert!(cache.get(&id, TargetSize::original()).await.is_some());
    }

    #[tokio::test]
    async fn test_eviction_removes_least_recently_used() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 10).await;
        let (a, b) = (key("a"), key("b"));

        cache.put_bytes(&a, Bytes::from_static(b"123456")).await.expect("put");
        cache.put_bytes(&b, Bytes::from_static(b"abcdef")).await.expect("put");

        assert!(!cache.contains(&a).await);
        assert!(cache.contains(&b).await);
        assert!(!entry_path(temp.path(), &a).exists());
        assert_eq!(cache.size().await, 6);
    }

    #[tokio::test]
    async fn test_eviction_order_survives_reopen() {
        let temp = TempDir::new().expect("tempdir");
        let (a, b, c) = (key("a"), key("b"), key("c"));
        {
            let cache = open(temp.path(), 1024).await;
            cache.put_bytes(&a, png(4, 4)).await.expect("put");
            cache.put_bytes(&b, png(4, 4)).await.expect("put");
            // Touch a so b becomes the eviction candidate.
            assert!(cache.get(&a, TargetSize::original()).await.is_some());
        }

        let replay = disk_journal::replay(temp.path())
            .await
            .expect("replay")
            .expect("journal");
        assert_eq!(replay.entries.peek_lru().map(|(k, _)| k.clone()), Some(b.clone()));

        let cache = open(temp.path(), 1024).await;
        let size = cache.size().await;
        drop(cache);
        let cache = open(temp.path(), size + 10).await;
        cache.put_bytes(&c, png(4, 4)).await.expect("put");
        assert!(cache.contains(&a).await);
        assert!(!cache.contains(&b).await);
        assert!(cache.contains(&c).await);
    }

    #[tokio::test]
    async fn test_partial_write_is_aborted() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        let id = key("partial");
        let body: ByteStream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"half an image")),
            Err(CacheError::Network("connection reset".into())),
        ])
        .boxed();

        let err = cache.put_stream(&id, body).await.expect_err("aborted");
        assert!(matches!(err, CacheError::PartialWrite(_)));
        assert!(!cache.contains(&id).await);
        assert!(!entry_path(temp.path(), &id).exists());
        assert!(!staging_path(temp.path(), &id).exists());
    }

    #[tokio::test]
    async fn test_failed_rewrite_keeps_previous_entry() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        let id = key("rewrite");
        cache.put_bytes(&id, png(6, 6)).await.expect("put");

        let body: ByteStream = futures_util::stream::iter(vec![Err(CacheError::Network(
            "timeout".into(),
        ))])
        .boxed();
        assert!(cache.put_stream(&id, body).await.is_err());

        assert!(cache.get(&id, TargetSize::original()).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_write_to_same_key_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let cache = Arc::new(open(temp.path(), 1024 * 1024).await);
        let id = key("busy");

        let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(1);
        let body: ByteStream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        })
        .boxed();

        let writer = {
            let cache = cache.clone();
            let id = id.clone();
            tokio::spawn(async move { cache.put_stream(&id, body).await })
        };

        loop {
            let editing = match cache.state.as_ref() {
                Some(state) => state.lock().await.editing.contains(&id),
                None => false,
            };
            if editing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = cache.put_bytes(&id, png(2, 2)).await;
        assert!(matches!(second, Err(CacheError::EditInProgress(_))));

        tx.send(png(3, 3)).await.expect("send");
        drop(tx);
        let size = writer.await.expect("join").expect("first write");
        assert!(size > 0);
        assert!(cache.contains(&id).await);
    }

    #[tokio::test]
    async fn test_commit_survives_journal_failure() {
        let temp = TempDir::new().expect("tempdir");
        let cache = Arc::new(open(temp.path(), 10).await);
        let (a, b) = (key("a"), key("b"));
        cache.put_bytes(&a, Bytes::from_static(b"123456")).await.expect("put");

        let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(1);
        let body: ByteStream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        })
        .boxed();
        let writer = {
            let cache = cache.clone();
            let b = b.clone();
            tokio::spawn(async move { cache.put_stream(&b, body).await })
        };

        let state = cache.state.as_ref().expect("enabled");
        while !state.lock().await.editing.contains(&b) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        state.lock().await.journal = Journal::read_only(temp.path()).await;

        tx.send(Bytes::from_static(b"abcdef")).await.expect("send");
        drop(tx);
        let size = writer.await.expect("join").expect("committed");
        assert_eq!(size, 6);
        assert!(cache.contains(&b).await);
        assert!(entry_path(temp.path(), &b).exists());
        assert!(!cache.contains(&a).await);
        assert!(!entry_path(temp.path(), &a).exists());
        assert_eq!(cache.size().await, 6);
    }

    #[tokio::test]
    async fn test_vanished_entry_file_is_forgotten() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        let id = key("vanished");
        cache.put_bytes(&id, png(4, 4)).await.expect("put");
        std::fs::remove_file(entry_path(temp.path(), &id)).expect("remove");

        assert!(cache.get(&id, TargetSize::original()).await.is_none());
        assert!(!cache.contains(&id).await);
        assert_eq!(cache.size().await, 0);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (0, 1));

        let replay = disk_journal::replay(temp.path())
            .await
            .expect("replay")
            .expect("journal");
        assert!(!replay.entries.contains(&id));
    }

    #[tokio::test]
    async fn test_open_discards_dirty_entries_and_staging_files() {
        let temp = TempDir::new().expect("tempdir");
        let (clean, dirty, unknown) = (key("clean"), key("dirty"), key("unknown"));
        {
            let cache = open(temp.path(), 1024 * 1024).await;
            cache.put_bytes(&clean, png(4, 4)).await.expect("put");
        }

        let journal = temp.path().join(JOURNAL_FILE);
        let mut content = std::fs::read_to_string(&journal).expect("read journal");
        content.push_str(&format!("DIRTY {dirty}\n"));
        std::fs::write(&journal, content).expect("write journal");
        std::fs::write(staging_path(temp.path(), &dirty), b"half").expect("staging");
        std::fs::write(entry_path(temp.path(), &dirty), b"stale").expect("entry");
        std::fs::write(entry_path(temp.path(), &unknown), b"orphan").expect("orphan");

        let cache = open(temp.path(), 1024 * 1024).await;
        assert!(cache.contains(&clean).await);
        assert!(!cache.contains(&dirty).await);
        assert!(!staging_path(temp.path(), &dirty).exists());
        assert!(!entry_path(temp.path(), &dirty).exists());
        assert!(!entry_path(temp.path(), &unknown).exists());
        assert!(entry_path(temp.path(), &clean).exists());
    }

    #[tokio::test]
    async fn test_insufficient_space_disables_tier() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), u64::MAX).await;
        let id = key("nowhere");

        assert!(!cache.is_enabled());
        assert!(!cache.is_persistent());
        assert_eq!(cache.put_bytes(&id, png(2, 2)).await, Ok(0));
        assert!(cache.get(&id, TargetSize::original()).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_dropped_on_read() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        let id = key("corrupt");
        cache
            .put_bytes(&id, Bytes::from_static(b"not an image"))
            .await
            .expect("put");

        assert!(cache.get(&id, TargetSize::original()).await.is_none());
        assert!(!cache.contains(&id).await);
    }

    #[tokio::test]
    async fn test_clear() {
        let temp = TempDir::new().expect("tempdir");
        let cache = open(temp.path(), 1024 * 1024).await;
        cache.put_bytes(&key("a"), png(2, 2)).await.expect("put");
        cache.put_bytes(&key("b"), png(2, 2)).await.expect("put");
        assert_eq!(cache.len().await, 2);

        cache.clear().await.expect("clear");
        assert!(cache.is_empty().await);
        assert_eq!(cache.size().await, 0);
        assert!(!entry_path(temp.path(), &key("a")).exists());
    }

    #[test]
    #[should_panic(expected = "must not run on the UI thread")]
    fn test_read_on_ui_thread_panics() {
        let temp = TempDir::new().expect("tempdir");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let cache = rt.block_on(open(temp.path(), 1024 * 1024));

        let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let _ui = UiContext::new(rx);
        let _ = rt.block_on(cache.get(&key("ui"), TargetSize::original()));
    }
}
