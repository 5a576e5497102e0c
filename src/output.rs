//! Stage reports returned by the library and printed by the CLI.
//!
//! All reports serialise to JSON (`ocrpdf … --json`).

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of one OCR stage run.
///
/// A run that attempted every page is `Ok(OcrStageReport)` even when pages
/// failed; check [`Self::failed`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrStageReport {
    pub input: PathBuf,
    pub cache_dir: PathBuf,
    pub total_pages: usize,
    /// Pages recognised and written to the cache during this run.
    pub newly_cached: Vec<usize>,
    /// Pages that already had an entry and were not sent to the provider.
    pub already_cached: Vec<usize>,
    /// Pages that failed this run and remain uncached.
    pub failed: Vec<PageError>,
    pub duration_ms: u64,
}

impl OcrStageReport {
    /// True when every page now has a cache entry.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
            && self.newly_cached.len() + self.already_cached.len() == self.total_pages
    }

    pub fn failed_pages(&self) -> Vec<usize> {
        self.failed.iter().map(PageError::page).collect()
    }
}

/// Result of one build stage run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildStageReport {
    pub input: PathBuf,
    pub total_pages: usize,
    /// Pages present in both outputs, ascending.
    pub included: Vec<usize>,
    /// Pages left out because they had no readable cache entry.
    pub gaps: Vec<usize>,
    pub markdown_path: PathBuf,
    pub pdf_path: PathBuf,
    pub markdown_bytes: usize,
    pub pdf_bytes: usize,
    pub duration_ms: u64,
}

impl BuildStageReport {
    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }
}

/// Cache coverage of a document, as reported by `ocrpdf status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub cache_dir: PathBuf,
    pub total_pages: usize,
    /// Pages in `1..=total_pages` with an entry.
    pub cached: Vec<usize>,
    /// Pages in `1..=total_pages` without an entry.
    pub missing: Vec<usize>,
    /// Entries whose page number is outside `1..=total_pages`.
    ///
    /// These are ignored by the build stage; they usually mean the cache
    /// directory belongs to a different document.
    pub stray: Vec<usize>,
}

impl CacheStatus {
    /// Compute coverage from the cached page numbers of a `total_pages` document.
    pub fn from_cached(cache_dir: PathBuf, total_pages: usize, entries: &[usize]) -> Self {
        let (cached, stray): (Vec<usize>, Vec<usize>) = entries
            .iter()
            .copied()
            .partition(|p| (1..=total_pages).contains(p));
        let missing = (1..=total_pages).filter(|p| !cached.contains(p)).collect();
        Self {
            cache_dir,
            total_pages,
            cached,
            missing,
            stray,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}
