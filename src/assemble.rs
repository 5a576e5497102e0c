//! Build-stage assembly: cached OCR results → Markdown + searchable PDF pages.
//!
//! [`assemble`] walks pages `1..=N` of the source in order. A page with a
//! readable cache entry is rendered at the configured DPI, overlaid with its
//! recognised lines and appended to both outputs; a page without one is a
//! *gap*: logged, recorded, and left out of both outputs. The two outputs
//! therefore always contain the same pages in the same order.
//!
//! ## Markdown format
//!
//! ```text
//! ## Page 1
//!
//! first line
//! second line
//!
//! ## Page 3
//!
//! …
//! ```
//!
//! Each section is `"## Page n\n\n" + lines.join("\n") + "\n"`; sections are
//! joined with `"\n"`.

use crate::cache::PageCache;
use crate::config::PipelineConfig;
use crate::error::OcrPdfError;
use crate::model::RecognizedLine;
use crate::pipeline::overlay::{layout_lines, OverlayPage, PositionedLine};
use crate::pipeline::render::{PageSize, PageSource};
use crate::progress::{SkipReason, Stage};
use tracing::{debug, info, warn};

/// Destination for searchable-PDF pages.
pub trait PdfSink {
    /// Append one page.
    fn add_page(&mut self, page: &OverlayPage) -> Result<(), OcrPdfError>;

    /// Serialise the document built so far.
    fn finish(&mut self) -> Result<Vec<u8>, OcrPdfError>;
}

/// Per-page result of the build stage.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// Rendered, overlaid and appended to both outputs.
    Included { line_count: usize },
    /// No cache entry.
    Missing,
    /// The entry exists but could not be read or parsed.
    Unreadable { detail: String },
}

impl BuildOutcome {
    pub fn is_gap(&self) -> bool {
        !matches!(self, BuildOutcome::Included { .. })
    }
}

/// Markdown and page bookkeeping from one pass over the document.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub markdown: String,
    pub included: Vec<usize>,
    pub gaps: Vec<usize>,
}

/// One Markdown section for `page_num`.
pub fn render_markdown_section(page_num: usize, lines: &[RecognizedLine]) -> String {
    let body: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
    format!("## Page {}\n\n{}\n", page_num, body.join("\n"))
}

/// Process one page: read the cache, render, overlay, append.
///
/// Gaps are returned as outcomes; rendering or PDF-writing failures are
/// fatal because the outputs could no longer match each other.
pub fn build_step(
    page_num: usize,
    source: &dyn PageSource,
    cache: &dyn PageCache,
    config: &PipelineConfig,
    sink: &mut dyn PdfSink,
    sections: &mut Vec<String>,
) -> Result<BuildOutcome, OcrPdfError> {
    let response = match cache.read(page_num) {
        Ok(r) => r,
        Err(OcrPdfError::CacheMiss { .. }) => return Ok(BuildOutcome::Missing),
        Err(e @ (OcrPdfError::CacheCorrupt { .. } | OcrPdfError::CacheRead { .. })) => {
            return Ok(BuildOutcome::Unreadable {
                detail: e.to_string(),
            })
        }
        Err(e) => return Err(e),
    };

    let lines = response.lines();
    let size = source.page_size(page_num)?;
    let image = source.render(page_num, config.dpi, config.max_rendered_pixels)?;
    let positioned = layout_lines(size, &lines, &config.overlay);

    sink.add_page(&OverlayPage {
        page_num,
        size,
        image,
        lines: positioned,
    })?;
    sections.push(render_markdown_section(page_num, &lines));

    Ok(BuildOutcome::Included {
        line_count: lines.len(),
    })
}

/// Walk every page of `source` and feed cached pages to `sink`.
///
/// Cache entries for pages beyond `source.page_count()` are never read.
pub fn assemble(
    source: &dyn PageSource,
    cache: &dyn PageCache,
    config: &PipelineConfig,
    sink: &mut dyn PdfSink,
) -> Result<Assembly, OcrPdfError> {
    let total = source.page_count();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Build, total);
    }

    let mut sections = Vec::new();
    let mut assembly = Assembly::default();

    for page_num in 1..=total {
        if let Some(cb) = cb {
            cb.on_page_start(page_num, total);
        }

        match build_step(page_num, source, cache, config, sink, &mut sections)? {
            BuildOutcome::Included { line_count } => {
                debug!("Page {}/{}: {} lines", page_num, total, line_count);
                assembly.included.push(page_num);
                if let Some(cb) = cb {
                    cb.on_page_assembled(page_num, total, line_count);
                }
            }
            gap => {
                let reason = match &gap {
                    BuildOutcome::Unreadable { detail } => {
                        warn!("Page {}: skipping, cache entry unreadable: {}", page_num, detail);
                        SkipReason::UnreadableCacheEntry
                    }
                    _ => {
                        warn!("Page {}: no cached OCR result, skipping", page_num);
                        SkipReason::MissingCacheEntry
                    }
                };
                assembly.gaps.push(page_num);
                if let Some(cb) = cb {
                    cb.on_page_skipped(page_num, total, reason);
                }
            }
        }
    }

    assembly.markdown = sections.join("\n");

    info!(
        "Assembled {}/{} pages ({} gaps)",
        assembly.included.len(),
        total,
        assembly.gaps.len()
    );
    if let Some(cb) = cb {
        cb.on_stage_complete(Stage::Build, total, assembly.included.len());
    }
    Ok(assembly)
}

// ── Recording sink ───────────────────────────────────────────────────────

/// A page as seen by [`RecordingSink`] (raster reduced to its size).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPage {
    pub page_num: usize,
    pub size: PageSize,
    pub image_width: u32,
    pub image_height: u32,
    pub lines: Vec<PositionedLine>,
}

/// [`PdfSink`] that keeps what it was given, for tests and dry runs.
///
/// `finish` returns one text line per page: `page <n>: <k> lines`.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub pages: Vec<RecordedPage>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.page_num).collect()
    }
}

impl PdfSink for RecordingSink {
    fn add_page(&mut self, page: &OverlayPage) -> Result<(), OcrPdfError> {
        self.pages.push(RecordedPage {
            page_num: page.page_num,
            size: page.size,
            image_width: page.image.width(),
            image_height: page.image.height(),
            lines: page.lines.clone(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, OcrPdfError> {
        let summary: String = self
            .pages
            .iter()
            .map(|p| format!("page {}: {} lines\n", p.page_num, p.lines.len()))
            .collect();
        Ok(summary.into_bytes())
    }
}
