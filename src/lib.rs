//! # edgequake-ocrpdf
//!
//! Turn scanned PDFs into a searchable PDF and a Markdown transcript using
//! AWS Textract, with a resumable on-disk cache of OCR results.
//!
//! ## Two stages, one cache
//!
//! ```text
//! OCR stage                                  build stage
//! ─────────                                  ───────────
//! PDF ─▶ render ─▶ encode ─▶ Textract ─┐     ┌─▶ render ─▶ image + invisible text ─▶ searchable PDF
//!                                      ▼     │
//!                                 ocr_cache/page_NNN.json ─▶ LINE text ─▶ Markdown
//! ```
//!
//! * The **OCR stage** ([`run_ocr_stage`]) visits pages `1..=N` in order and
//!   sends every page without a cache entry to the OCR provider. Successful
//!   responses are written to the cache; failures are logged and the page
//!   stays uncached. A cache entry is never overwritten, so re-running the
//!   stage only does the work that is still missing.
//! * The **build stage** ([`run_build_stage`]) reads the cache, re-renders
//!   each cached page at the same DPI and emits both outputs. Pages without
//!   a cache entry are left out of both and reported as gaps.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocrpdf::{run_build_stage, run_ocr_stage, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from the standard AWS chain.
//!     let config = PipelineConfig::builder()
//!         .input("input/bylaws.pdf")
//!         .build()?;
//!
//!     let ocr = run_ocr_stage(&config).await?;
//!     eprintln!("{} pages newly cached, {} failed", ocr.newly_cached.len(), ocr.failed.len());
//!
//!     let build = run_build_stage(&config).await?;
//!     eprintln!("wrote {} and {}", build.pdf_path.display(), build.markdown_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrpdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocrpdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Testing without AWS or pdfium
//!
//! Every collaborator sits behind a trait: [`PageSource`], [`PageCache`],
//! [`OcrProvider`] and [`PdfSink`]. [`run_ocr_pages`] and [`assemble`] take
//! trait objects, so [`MemoryPageCache`], [`MockOcrProvider`] and
//! [`RecordingSink`] drive both stages entirely in memory.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{assemble, render_markdown_section, Assembly, BuildOutcome, PdfSink, RecordingSink};
pub use cache::{FsPageCache, MemoryPageCache, PageCache, WriteOutcome};
pub use config::{OverlayStyle, PipelineConfig, PipelineConfigBuilder};
pub use error::{OcrPdfError, PageError};
pub use model::{Block, BlockType, OcrResponse, RecognizedLine};
pub use output::{BuildStageReport, CacheStatus, OcrStageReport};
pub use pipeline::ocr::{MockOcrProvider, OcrError, OcrProvider, TextractProvider};
pub use pipeline::render::{PageSize, PageSource};
pub use progress::{
    NoopProgressCallback, PipelineProgressCallback, ProgressCallback, SkipReason, Stage,
};
pub use stage::{
    cache_status, ocr_step, run_build_stage, run_ocr_pages, run_ocr_stage,
    run_ocr_stage_with_provider, OcrOutcome,
};
