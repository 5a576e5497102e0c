//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as either stage walks the document. The CLI uses it to drive an
//! `indicatif` bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocrpdf::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     cached: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_page_cached(&self, page_num: usize, total_pages: usize, line_count: usize) {
//!         self.cached.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} cached ({} lines)", page_num, total_pages, line_count);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { cached: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which half of the pipeline is emitting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Render → OCR → cache.
    Ocr,
    /// Cache → render → overlay → outputs.
    Build,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ocr => f.write_str("OCR"),
            Stage::Build => f.write_str("build"),
        }
    }
}

/// Why a page was passed over without doing any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// OCR stage: the page already has a cache entry.
    AlreadyCached,
    /// Build stage: the page has no cache entry.
    MissingCacheEntry,
    /// Build stage: the page's cache entry exists but cannot be read or parsed.
    UnreadableCacheEntry,
}

/// Called by both stages as they process each page.
///
/// Pages are processed strictly one after another, in increasing order, so
/// implementations never see concurrent calls from a single run. The trait
/// is still `Send + Sync` so a callback can be shared with other threads.
/// All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first page of a stage.
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let _ = (stage, total_pages);
    }

    /// Called before a page is rendered.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// OCR stage: a page was recognised and its response written to the cache.
    ///
    /// `line_count` is the number of LINE blocks in the response.
    fn on_page_cached(&self, page_num: usize, total_pages: usize, line_count: usize) {
        let _ = (page_num, total_pages, line_count);
    }

    /// Build stage: a page was rendered, overlaid and appended to both outputs.
    fn on_page_assembled(&self, page_num: usize, total_pages: usize, line_count: usize) {
        let _ = (page_num, total_pages, line_count);
    }

    /// A page was passed over without work.
    fn on_page_skipped(&self, page_num: usize, total_pages: usize, reason: SkipReason) {
        let _ = (page_num, total_pages, reason);
    }

    /// OCR stage: a page failed; it stays uncached for the next run.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page of a stage was visited.
    ///
    /// `success_count` counts pages cached (OCR) or assembled (build).
    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        let _ = (stage, total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
