//! Source validation: make sure the configured PDF can be handed to pdfium.
//!
//! pdfium's own error for a missing or non-PDF file is an opaque load
//! failure. Checking existence, read permission and the `%PDF` magic bytes
//! first turns the common mistakes into precise fatal errors before any
//! stage touches the cache.

use crate::error::OcrPdfError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` is a readable PDF file and return it.
pub fn validate_source(path: &Path) -> Result<PathBuf, OcrPdfError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(OcrPdfError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                Ok(()) => return Err(OcrPdfError::NotAPdf { path, magic }),
                // Shorter than four bytes: cannot be a PDF.
                Err(_) => return Err(OcrPdfError::NotAPdf { path, magic }),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OcrPdfError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(OcrPdfError::FileNotFound { path });
        }
    }

    debug!("Resolved source PDF: {}", path.display());
    Ok(path)
}
