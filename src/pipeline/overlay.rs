//! Searchable-PDF page construction: raster background + invisible text.
//!
//! [`layout_lines`] turns recognised lines into absolute text positions;
//! [`PdfiumSink`] writes each page as a full-bleed image with one text
//! object per line in render mode 3 (invisible: neither filled nor stroked).
//! The text is found by search and copy but never painted over the scan.
//!
//! PDF user space has its origin at the bottom-left corner, so a baseline
//! `top_offset` points below the top edge sits at `height - top_offset`.

use crate::assemble::PdfSink;
use crate::config::OverlayStyle;
use crate::error::OcrPdfError;
use crate::model::RecognizedLine;
use crate::pipeline::render::PageSize;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// One text-layer entry in PDF user space (points, bottom-left origin).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

/// Everything the sink needs to emit one output page.
#[derive(Debug, Clone)]
pub struct OverlayPage {
    /// 1-indexed source page this output page came from.
    pub page_num: usize,
    pub size: PageSize,
    pub image: DynamicImage,
    pub lines: Vec<PositionedLine>,
}

/// Place `lines` top to bottom at the left margin, in the given order.
///
/// When the lines would run past `bottom_margin` at the configured pitch,
/// the pitch shrinks so the last baseline lands on the bottom margin.
/// Baselines are clamped to the page, so every line is on the page.
pub fn layout_lines(size: PageSize, lines: &[RecognizedLine], style: &OverlayStyle) -> Vec<PositionedLine> {
    let first = (size.height - style.top_offset).clamp(0.0, size.height);
    let pitch = effective_pitch(size, lines.len(), style);

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| PositionedLine {
            text: line.text.clone(),
            x: style.left_margin.min(size.width),
            y: (first - i as f32 * pitch).clamp(0.0, size.height),
            font_size: style.font_size,
        })
        .collect()
}

fn effective_pitch(size: PageSize, count: usize, style: &OverlayStyle) -> f32 {
    if count < 2 {
        return style.line_pitch;
    }
    let span = (count - 1) as f32;
    let available = (size.height - style.top_offset - style.bottom_margin).max(0.0);
    if span * style.line_pitch <= available {
        style.line_pitch
    } else {
        let compressed = available / span;
        debug!(
            "{} lines overflow the page at {}pt pitch; compressing to {:.2}pt",
            count, style.line_pitch, compressed
        );
        compressed
    }
}

/// [`PdfSink`] that builds a new pdfium document in memory.
pub struct PdfiumSink<'a> {
    document: PdfDocument<'a>,
    font: PdfFontToken,
    pages: usize,
}

impl<'a> PdfiumSink<'a> {
    pub fn new(pdfium: &'a Pdfium) -> Result<Self, OcrPdfError> {
        let mut document = pdfium.create_new_pdf().map_err(pdf_write_err)?;
        let font = document.fonts_mut().helvetica();
        Ok(Self {
            document,
            font,
            pages: 0,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }
}

impl PdfSink for PdfiumSink<'_> {
    fn add_page(&mut self, page: &OverlayPage) -> Result<(), OcrPdfError> {
        let width = PdfPoints::new(page.size.width);
        let height = PdfPoints::new(page.size.height);

        let mut pdf_page = self
            .document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(pdf_write_err)?;

        pdf_page
            .objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &page.image,
                Some(width),
                Some(height),
            )
            .map_err(pdf_write_err)?;

        for line in &page.lines {
            let mut text = PdfPageTextObject::new(
                &self.document,
                &line.text,
                self.font,
                PdfPoints::new(line.font_size),
            )
            .map_err(pdf_write_err)?;
            text.set_render_mode(PdfPageTextRenderMode::Invisible)
                .map_err(pdf_write_err)?;
            text.translate(PdfPoints::new(line.x), PdfPoints::new(line.y))
                .map_err(pdf_write_err)?;
            pdf_page
                .objects_mut()
                .add_text_object(text)
                .map_err(pdf_write_err)?;
        }

        self.pages += 1;
        debug!(
            "Page {}: appended {}x{}pt page with {} text lines",
            page.page_num,
            page.size.width,
            page.size.height,
            page.lines.len()
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, OcrPdfError> {
        self.document.save_to_bytes().map_err(pdf_write_err)
    }
}

fn pdf_write_err(e: PdfiumError) -> OcrPdfError {
    OcrPdfError::PdfWriteFailed {
        detail: format!("{:?}", e),
    }
}
