//! Per-page building blocks shared by the OCR and build stages.
//!
//! Each submodule implements exactly one transformation step; the stage
//! drivers in [`crate::stage`] wire them together.
//!
//! ## Data Flow
//!
//! ```text
//! OCR stage:   input ──▶ engine ──▶ render ──▶ encode ──▶ ocr ──▶ cache
//! build stage: input ──▶ engine ──▶ render ─┬─────────────────────▶ overlay ──▶ PDF
//!                                 cache ────┴──▶ lines ──▶ markdown
//! ```
//!
//! 1. [`input`]   check the source path exists and starts with `%PDF`
//! 2. [`engine`]  bind the pdfium library
//! 3. [`render`]  rasterise one page at the configured DPI
//! 4. [`encode`]  PNG-encode the raster, JPEG when PNG is too large
//! 5. [`ocr`]     call the OCR provider with throttling and bounded retry;
//!    the only step with network I/O
//! 6. [`overlay`] lay out the invisible text layer and write PDF pages

pub mod encode;
pub mod engine;
pub mod input;
pub mod ocr;
pub mod overlay;
pub mod render;
