//! pdfium binding.
//!
//! Resolution order (first match wins):
//!
//! 1. `PDFIUM_LIB_PATH` pointing at the library file itself;
//! 2. `PDFIUM_LIB_PATH` pointing at a directory containing the platform
//!    library (`libpdfium.so`, `libpdfium.dylib`, `pdfium.dll`);
//! 3. the current directory;
//! 4. the system library search path.
//!
//! Failure to bind is fatal for both stages: neither can open the source
//! document without pdfium.

use crate::error::OcrPdfError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an existing pdfium library or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to pdfium using the resolution order above.
pub fn bind_pdfium() -> Result<Pdfium, OcrPdfError> {
    let explicit = std::env::var(PDFIUM_LIB_PATH_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    if let Some(path) = explicit {
        let lib = library_path(&path);
        debug!("Binding pdfium from {}", lib.display());
        return bind_pdfium_from_path(&lib);
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| OcrPdfError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// Bind to the pdfium library at an explicit file path.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, OcrPdfError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| OcrPdfError::PdfiumBindingFailed(format!("{}: {}", path.display(), e)))
}

fn library_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}
