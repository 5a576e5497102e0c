//! Error types for the edgequake-ocrpdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrPdfError`]: **Fatal**: the stage cannot proceed at all (source PDF
//!   missing or unreadable, pdfium not available, output not writable).
//!   Returned as `Err(OcrPdfError)` from the stage drivers in
//!   [`crate::stage`].
//!
//! * [`PageError`]: **Non-fatal**: a single page failed during the OCR stage
//!   (render glitch, Textract error) but the run continues. The page is left
//!   without a cache entry and becomes eligible again on the next run.
//!   Collected in [`crate::output::OcrStageReport::failed`].
//!
//! A missing cache entry during the build stage is neither: it is a *gap*,
//! logged as a warning and recorded in [`crate::output::BuildStageReport`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocrpdf library.
#[derive(Debug, Error)]
pub enum OcrPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source PDF was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// A page number outside `1..=total` was requested from the page source.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// pdfium failed while building or serialising the searchable PDF.
    #[error("Failed to write searchable PDF: {detail}")]
    PdfWriteFailed { detail: String },

    // ── Cache errors ──────────────────────────────────────────────────────
    /// The cache directory could not be created or listed.
    #[error("Cache directory '{path}' is not usable: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cache entry was requested for a page that has none.
    #[error("No cached OCR result for page {page}")]
    CacheMiss { page: usize },

    /// A cache file exists but could not be read.
    #[error("Failed to read cache entry '{path}': {source}")]
    CacheRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cache file exists but does not contain a valid OCR response.
    #[error("Cache entry '{path}' is corrupt: {detail}\nDelete it to force re-OCR of page {page}.")]
    CacheCorrupt {
        page: usize,
        path: PathBuf,
        detail: String,
    },

    /// A cache entry could not be written.
    #[error("Failed to write cache entry for page {page}: {detail}")]
    CacheWrite { page: usize, detail: String },

    // ── OCR provider errors ───────────────────────────────────────────────
    /// The OCR provider could not be constructed (bad region, endpoint…).
    #[error("OCR provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write one of the final output files.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, then either:\n\
  • place it on the system library path, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrPdfError {
    /// True for errors that prevent the source document from being opened.
    ///
    /// These abort a stage before any page is processed.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            OcrPdfError::FileNotFound { .. }
                | OcrPdfError::PermissionDenied { .. }
                | OcrPdfError::NotAPdf { .. }
                | OcrPdfError::CorruptPdf { .. }
                | OcrPdfError::PasswordRequired { .. }
                | OcrPdfError::WrongPassword { .. }
                | OcrPdfError::PdfiumBindingFailed(_)
        )
    }
}

/// A non-fatal error for a single page of the OCR stage.
///
/// The page is left uncached; the next OCR run will try it again.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The raster could not be encoded for upload.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// OCR call failed (after `retries` additional attempts).
    #[error("Page {page}: OCR call failed after {retries} retries: {detail}")]
    OcrFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// OCR succeeded but the response could not be cached.
    #[error("Page {page}: caching the OCR result failed: {detail}")]
    CacheWriteFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::OcrFailed { page, .. }
            | PageError::CacheWriteFailed { page, .. } => *page,
        }
    }
}
