//! PDF rasterisation: render one page at a time to a `DynamicImage`.
//!
//! Both stages render through the [`PageSource`] trait. [`PdfiumSource`] is
//! the real implementation; tests drive the stages with an in-memory source
//! so neither pdfium nor a sample PDF is needed to exercise the pipeline.
//!
//! Rendering is deterministic: the same page at the same DPI always yields
//! the same pixels, so the build stage can re-render the exact raster the OCR
//! stage sent to Textract instead of caching images.

use crate::error::OcrPdfError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Physical page size in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// US Letter, 612 × 792 pt.
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }
}

/// A document whose pages can be measured and rasterised.
///
/// Page numbers are 1-indexed and valid in `1..=page_count()`.
pub trait PageSource {
    /// Number of pages, fixed for the lifetime of the source.
    fn page_count(&self) -> usize;

    /// Size of `page_num` in points.
    fn page_size(&self, page_num: usize) -> Result<PageSize, OcrPdfError>;

    /// Rasterise `page_num` at `dpi`, longest edge capped at `max_pixels`.
    fn render(&self, page_num: usize, dpi: u32, max_pixels: u32) -> Result<DynamicImage, OcrPdfError>;
}

/// Pixel dimensions for rendering `size` at `dpi`, with the longest edge
/// capped at `max_pixels` (aspect ratio preserved, never below 1 px).
pub fn raster_dimensions(size: PageSize, dpi: u32, max_pixels: u32) -> (u32, u32) {
    let scale = dpi as f32 / 72.0;
    let mut w = size.width * scale;
    let mut h = size.height * scale;

    let longest = w.max(h);
    if longest > max_pixels as f32 && longest > 0.0 {
        let shrink = max_pixels as f32 / longest;
        w *= shrink;
        h *= shrink;
    }

    ((w.round() as u32).max(1), (h.round() as u32).max(1))
}

/// [`PageSource`] backed by a pdfium document.
pub struct PdfiumSource<'a> {
    path: PathBuf,
    document: PdfDocument<'a>,
    page_count: usize,
}

impl<'a> PdfiumSource<'a> {
    /// Open `pdf_path`; any failure here aborts the stage.
    pub fn open(
        pdfium: &'a Pdfium,
        pdf_path: &Path,
        password: Option<&'a str>,
    ) -> Result<Self, OcrPdfError> {
        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    OcrPdfError::WrongPassword {
                        path: pdf_path.to_path_buf(),
                    }
                } else {
                    OcrPdfError::PasswordRequired {
                        path: pdf_path.to_path_buf(),
                    }
                }
            } else {
                OcrPdfError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let page_count = document.pages().len() as usize;
        info!("PDF loaded: {} pages ({})", page_count, pdf_path.display());

        Ok(Self {
            path: pdf_path.to_path_buf(),
            document,
            page_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page(&self, page_num: usize) -> Result<PdfPage<'a>, OcrPdfError> {
        if page_num == 0 || page_num > self.page_count {
            return Err(OcrPdfError::PageOutOfRange {
                page: page_num,
                total: self.page_count,
            });
        }
        self.document
            .pages()
            .get((page_num - 1) as u16)
            .map_err(|e| OcrPdfError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })
    }
}

impl PageSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page_num: usize) -> Result<PageSize, OcrPdfError> {
        let page = self.page(page_num)?;
        Ok(PageSize::new(page.width().value, page.height().value))
    }

    fn render(&self, page_num: usize, dpi: u32, max_pixels: u32) -> Result<DynamicImage, OcrPdfError> {
        let page = self.page(page_num)?;
        let size = PageSize::new(page.width().value, page.height().value);
        let (w, h) = raster_dimensions(size, dpi, max_pixels);

        let render_config = PdfRenderConfig::new()
            .set_target_width(w as i32)
            .set_target_height(h as i32)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| OcrPdfError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px at {} DPI",
            page_num,
            image.width(),
            image.height(),
            dpi
        );
        Ok(image)
    }
}
