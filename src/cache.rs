//! Page-indexed, write-once store of raw OCR responses.
//!
//! The cache is the only state the two stages share. Resumability falls out
//! of one rule: [`PageCache::write`] never replaces an existing entry. A rerun
//! of the OCR stage therefore only does work for pages that have no entry
//! yet, and the only way to force re-OCR of a page is to delete its file.
//!
//! ## On-disk layout
//!
//! ```text
//! ocr_cache/
//!   page_001.json   ← full Textract response for page 1
//!   page_002.json
//!   …
//! ```
//!
//! Each record is the pretty-printed response JSON; the directory listing is
//! the entire resumability state (no manifest, no lock file). Writes go to a
//! temp file in the same directory and are persisted with a no-clobber
//! rename, so a crash mid-write never leaves a truncated entry behind.
//!
//! Concurrent writers on one directory are not supported. Two OCR runs
//! racing on the same cache will not corrupt entries (no-clobber), but which
//! response wins for a page is undefined.

use crate::error::OcrPdfError;
use crate::model::OcrResponse;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Result of a [`PageCache::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry did not exist and has been stored.
    Written,
    /// An entry already existed; nothing was changed.
    AlreadyPresent,
}

/// Key-value store of OCR responses keyed by 1-indexed page number.
pub trait PageCache {
    /// Whether an entry exists for `page`.
    fn has(&self, page: usize) -> bool;

    /// Read the entry for `page`; [`OcrPdfError::CacheMiss`] if absent.
    fn read(&self, page: usize) -> Result<OcrResponse, OcrPdfError>;

    /// Store `entry` for `page` unless one already exists.
    fn write(&self, page: usize, entry: &OcrResponse) -> Result<WriteOutcome, OcrPdfError>;

    /// All page numbers that currently have an entry, ascending.
    fn cached_pages(&self) -> Result<Vec<usize>, OcrPdfError>;
}

// ── Filesystem cache ─────────────────────────────────────────────────────

static ENTRY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page_(\d+)\.json$").expect("static regex"));

/// File name of the entry for `page`: `page_007.json`.
pub fn entry_file_name(page: usize) -> String {
    format!("page_{page:03}.json")
}

/// Parse a cache file name back to its page number.
///
/// Only the canonical spelling counts: `page_2.json` or `page_0002.json`
/// are not entries, since [`PageCache::has`] and [`PageCache::read`] never
/// look at them.
pub fn parse_entry_file_name(name: &str) -> Option<usize> {
    ENTRY_NAME
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|&page| entry_file_name(page) == name)
}

/// Directory-backed [`PageCache`].
#[derive(Debug, Clone)]
pub struct FsPageCache {
    dir: PathBuf,
}

impl FsPageCache {
    /// Open a cache directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, OcrPdfError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| OcrPdfError::CacheDir {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// Open an existing cache directory without creating it.
    ///
    /// A missing directory behaves as an empty cache for reads; used by the
    /// build stage and `status`, which must not create state.
    pub fn open_existing(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for `page`, whether or not it exists.
    pub fn entry_path(&self, page: usize) -> PathBuf {
        self.dir.join(entry_file_name(page))
    }
}

impl PageCache for FsPageCache {
    fn has(&self, page: usize) -> bool {
        self.entry_path(page).is_file()
    }

    fn read(&self, page: usize) -> Result<OcrResponse, OcrPdfError> {
        let path = self.entry_path(page);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OcrPdfError::CacheMiss { page });
            }
            Err(e) => return Err(OcrPdfError::CacheRead { path, source: e }),
        };
        serde_json::from_slice(&bytes).map_err(|e| OcrPdfError::CacheCorrupt {
            page,
            path,
            detail: e.to_string(),
        })
    }

    fn write(&self, page: usize, entry: &OcrResponse) -> Result<WriteOutcome, OcrPdfError> {
        let path = self.entry_path(page);
        if path.exists() {
            debug!("Page {}: cache entry exists, not overwriting", page);
            return Ok(WriteOutcome::AlreadyPresent);
        }

        let cache_err = |detail: String| OcrPdfError::CacheWrite { page, detail };

        let json = serde_json::to_vec_pretty(entry).map_err(|e| cache_err(e.to_string()))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| OcrPdfError::CacheDir {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".page_")
            .suffix(".json.tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| cache_err(format!("temp file: {e}")))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| cache_err(format!("temp write: {e}")))?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!("Page {}: cached {} bytes → {}", page, json.len(), path.display());
                Ok(WriteOutcome::Written)
            }
            // Another writer got there first; the existing entry stands.
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(WriteOutcome::AlreadyPresent)
            }
            Err(e) => Err(cache_err(format!("persist {}: {}", path.display(), e.error))),
        }
    }

    fn cached_pages(&self) -> Result<Vec<usize>, OcrPdfError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(OcrPdfError::CacheDir {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut pages: Vec<usize> = entries
            .flatten()
            .filter(|e| e.path().is_file())
            .filter_map(|e| parse_entry_file_name(&e.file_name().to_string_lossy()))
            .collect();
        pages.sort_unstable();
        pages.dedup();
        Ok(pages)
    }
}

// ── In-memory cache ──────────────────────────────────────────────────────

/// In-memory [`PageCache`] with the same write-once semantics.
#[derive(Debug, Default)]
pub struct MemoryPageCache {
    entries: RwLock<BTreeMap<usize, OcrResponse>>,
}

impl MemoryPageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `page` (overwrites; for test setup only).
    pub fn insert(&self, page: usize, entry: OcrResponse) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(page, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageCache for MemoryPageCache {
    fn has(&self, page: usize) -> bool {
        self.entries
            .read()
            .map(|m| m.contains_key(&page))
            .unwrap_or(false)
    }

    fn read(&self, page: usize) -> Result<OcrResponse, OcrPdfError> {
        let map = self
            .entries
            .read()
            .map_err(|_| OcrPdfError::Internal("memory cache lock poisoned".into()))?;
        map.get(&page)
            .cloned()
            .ok_or(OcrPdfError::CacheMiss { page })
    }

    fn write(&self, page: usize, entry: &OcrResponse) -> Result<WriteOutcome, OcrPdfError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| OcrPdfError::Internal("memory cache lock poisoned".into()))?;
        if map.contains_key(&page) {
            return Ok(WriteOutcome::AlreadyPresent);
        }
        map.insert(page, entry.clone());
        Ok(WriteOutcome::Written)
    }

    fn cached_pages(&self) -> Result<Vec<usize>, OcrPdfError> {
        let map = self
            .entries
            .read()
            .map_err(|_| OcrPdfError::Internal("memory cache lock poisoned".into()))?;
        Ok(map.keys().copied().collect())
    }
}
