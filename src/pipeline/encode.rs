//! Image encoding: `DynamicImage` → bytes for the OCR request.
//!
//! PNG first: it is lossless, and text edges matter more than file size for
//! recognition accuracy. Textract's synchronous API refuses payloads above
//! 10 MiB, which a dense 350 DPI scan can exceed as PNG; such pages are
//! re-encoded as JPEG at decreasing quality until they fit.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

const JPEG_QUALITIES: [u8; 3] = [90, 75, 60];

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("page image is {size} bytes even as JPEG (limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

/// An encoded page raster ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// Encode `img` as PNG, falling back to JPEG when PNG exceeds `max_bytes`.
pub fn encode_page(img: &DynamicImage, max_bytes: usize) -> Result<EncodedImage, EncodeError> {
    let png = encode_png(img)?;
    if png.len() <= max_bytes {
        debug!("Encoded page → {} bytes PNG", png.len());
        return Ok(EncodedImage {
            bytes: png,
            format: ImageFormat::Png,
        });
    }

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut smallest = png.len();
    for quality in JPEG_QUALITIES {
        let jpeg = encode_jpeg(&rgb, quality)?;
        debug!(
            "PNG {} bytes over limit; JPEG q{} → {} bytes",
            png.len(),
            quality,
            jpeg.len()
        );
        if jpeg.len() <= max_bytes {
            return Ok(EncodedImage {
                bytes: jpeg,
                format: ImageFormat::Jpeg,
            });
        }
        smallest = smallest.min(jpeg.len());
    }

    Err(EncodeError::TooLarge {
        size: smallest,
        limit: max_bytes,
    })
}

/// Lossless PNG bytes of `img`.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

fn encode_jpeg(rgb: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}
