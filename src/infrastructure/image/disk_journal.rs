//! Append-only journal recording the disk cache's entries and their recency.
//!
//! Line format, one record per line after a two-line header:
//!
//! ```text
//! imgcache.DiskLru
//! 1
//! DIRTY <key>
//! CLEAN <key> <size>
//! REMOVE <key>
//! READ <key>
//! ```
//!
//! Replaying the records in order reproduces the LRU order of the last run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lru::LruCache;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};

/// Journal file name inside the cache directory.
pub const JOURNAL_FILE: &str = "journal";
const JOURNAL_TMP_FILE: &str = "journal.tmp";
const MAGIC: &str = "imgcache.DiskLru";
const VERSION: &str = "1";

/// Redundant record count that triggers a rewrite.
const COMPACT_THRESHOLD: usize = 2000;

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// A write has started; the entry is not readable yet.
    Dirty(CacheKey),
    /// A write committed with the given size in bytes.
    Clean(CacheKey, u64),
    /// The entry was deleted or its write aborted.
    Remove(CacheKey),
    /// The entry was read.
    Read(CacheKey),
}

impl JournalRecord {
    /// Parses one line. Returns `None` for anything malformed.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let kind = parts.next()?;
        let key = CacheKey::from_hex(parts.next()?)?;
        let record = match kind {
            "DIRTY" => Self::Dirty(key),
            "CLEAN" => Self::Clean(key, parts.next()?.parse().ok()?),
            "REMOVE" => Self::Remove(key),
            "READ" => Self::Read(key),
            _ => return None,
        };
        parts.next().is_none().then_some(record)
    }

    /// Formats the record without the trailing newline.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::Dirty(key) => format!("DIRTY {key}"),
            Self::Clean(key, size) => format!("CLEAN {key} {size}"),
            Self::Remove(key) => format!("REMOVE {key}"),
            Self::Read(key) => format!("READ {key}"),
        }
    }
}

/// Index rebuilt from a journal.
#[derive(Debug)]
pub struct Replay {
    /// Committed entries and their sizes, most recently used first.
    pub entries: LruCache<CacheKey, u64>,
    /// Keys whose last write never committed.
    pub dirty: HashSet<CacheKey>,
}

impl Default for Replay {
    fn default() -> Self {
        Self {
            entries: LruCache::unbounded(),
            dirty: HashSet::new(),
        }
    }
}

impl Replay {
    fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::Dirty(key) => {
                self.dirty.insert(key);
            }
            JournalRecord::Clean(key, size) => {
                self.dirty.remove(&key);
                self.entries.put(key, size);
            }
            JournalRecord::Remove(key) => {
                self.dirty.remove(&key);
                self.entries.pop(&key);
            }
            JournalRecord::Read(key) => {
                self.entries.promote(&key);
            }
        }
    }
}

/// Reads the journal in `dir`.
///
/// Returns `None` if there is no journal or its header is not recognised;
/// the caller then starts from an empty index.
///
/// # Errors
/// Returns an I/O error if the file exists but cannot be read.
pub async fn replay(dir: &Path) -> CacheResult<Option<Replay>> {
    let path = dir.join(JOURNAL_FILE);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io("failed to read journal", &e)),
    };

    let mut lines = content.lines();
    if lines.next() != Some(MAGIC) || lines.next() != Some(VERSION) {
        warn!(path = %path.display(), "Unrecognised journal header, starting fresh");
        return Ok(None);
    }

    let mut replay = Replay::default();
    let mut skipped = 0usize;
    for line in lines {
        match JournalRecord::parse(line) {
            Some(record) => replay.apply(record),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "Ignored malformed journal lines");
    }
    debug!(
        entries = replay.entries.len(),
        dirty = replay.dirty.len(),
        "Replayed disk cache journal"
    );
    Ok(Some(replay))
}

/// Open journal accepting appended records.
pub struct Journal {
    dir: PathBuf,
    writer: BufWriter<fs::File>,
    records: usize,
}

impl Journal {
    /// Rewrites the journal as the minimal record set for `entries` and `dirty`,
    /// then reopens it for appending.
    ///
    /// The new file is written aside and renamed over the old one, so a crash
    /// leaves either journal intact.
    ///
    /// # Errors
    /// Returns an I/O error if the journal cannot be written or renamed.
    pub async fn rebuild(
        dir: &Path,
        entries: &LruCache<CacheKey, u64>,
        dirty: &HashSet<CacheKey>,
    ) -> CacheResult<Self> {
        let tmp_path = dir.join(JOURNAL_TMP_FILE);
        let path = dir.join(JOURNAL_FILE);

        let mut content = format!("{MAGIC}\n{VERSION}\n");
        // Oldest first so a replay restores the same order.
        for (key, size) in entries.iter().rev() {
            content.push_str(&JournalRecord::Clean(key.clone(), *size).to_line());
            content.push('\n');
        }
        for key in dirty {
            content.push_str(&JournalRecord::Dirty(key.clone()).to_line());
            content.push('\n');
        }

        fs::write(&tmp_path, content)
            .await
            .map_err(|e| CacheError::io("failed to write journal", &e))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| CacheError::io("failed to replace journal", &e))?;

        let file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CacheError::io("failed to open journal", &e))?;

        debug!(entries = entries.len(), "Rebuilt disk cache journal");
        Ok(Self {
            dir: dir.to_path_buf(),
            writer: BufWriter::new(file),
            records: entries.len() + dirty.len(),
        })
    }

    /// Appends a record and flushes it to the file.
    ///
    /// # Errors
    /// Returns an I/O error if the write fails.
    pub async fn append(&mut self, record: &JournalRecord) -> CacheResult<()> {
        let mut line = record.to_line();
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CacheError::io("failed to append to journal", &e))?;
        self.writer
            .flush()
            .await
            .map_err(|e| CacheError::io("failed to flush journal", &e))?;
        self.records += 1;
        Ok(())
    }

    /// Returns true once redundant records outnumber both the threshold and the
    /// live entries.
    #[must_use]
    pub const fn needs_compaction(&self, live_entries: usize) -> bool {
        let redundant = self.records.saturating_sub(live_entries);
        redundant >= COMPACT_THRESHOLD && redundant >= live_entries
    }

    /// Directory holding the journal.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Opens the existing journal without write access, so every append fails.
    #[cfg(test)]
    pub(crate) async fn read_only(dir: &Path) -> Self {
        let file = fs::File::open(dir.join(JOURNAL_FILE))
            .await
            .expect("open journal");
        Self {
            dir: dir.to_path_buf(),
            writer: BufWriter::new(file),
            records: 0,
        }
    }
}
