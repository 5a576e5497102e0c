//! Configuration types for the OCR and build stages.
//!
//! Every path and tunable lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Both stages read the same struct so the DPI used
//! for OCR is, by construction, the DPI used to rasterise the background of
//! the searchable PDF.

use crate::error::OcrPdfError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Textract's synchronous API rejects images above 10 MiB.
pub const TEXTRACT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Textract's synchronous API rejects images above 10 000 px on either edge.
pub const TEXTRACT_MAX_PIXELS: u32 = 10_000;

/// Configuration for the OCR stage, the build stage, or both.
///
/// # Example
/// ```rust
/// use edgequake_ocrpdf::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .input("input/bylaws.pdf")
///     .cache_dir("ocr_cache")
///     .dpi(300)
///     .throttle_ms(250)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_markdown_path().file_name().unwrap(), "bylaws.md");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Source PDF. Default: `input/document.pdf`.
    pub input: PathBuf,

    /// Directory holding one `page_NNN.json` record per OCR'd page. Default: `ocr_cache`.
    ///
    /// This directory is the only state shared between the two stages.
    pub cache_dir: PathBuf,

    /// Directory receiving the searchable PDF and the Markdown file. Default: `output`.
    pub output_dir: PathBuf,

    /// Explicit searchable-PDF path. Default: `<output_dir>/<stem>_searchable.pdf`.
    pub output_pdf: Option<PathBuf>,

    /// Explicit Markdown path. Default: `<output_dir>/<stem>.md`.
    pub output_markdown: Option<PathBuf>,

    /// Rasterisation DPI for both stages. Range: 72–600. Default: 350.
    ///
    /// Scanned documents usually carry small print; 350 DPI keeps Textract
    /// accuracy high while a letter page still fits under the upload limit.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 10 000.
    ///
    /// When `dpi` would exceed it (large-format pages), the render scale is
    /// reduced so the longest edge equals the cap.
    pub max_rendered_pixels: u32,

    /// Largest image payload sent to the OCR service. Default: 10 MiB.
    ///
    /// PNG is tried first; above this size the page is re-encoded as JPEG.
    pub max_image_bytes: usize,

    /// Minimum delay between consecutive successful OCR calls, in ms. Default: 150.
    pub throttle_ms: u64,

    /// AWS region of the Textract endpoint. Default: `us-east-2`.
    pub region: String,

    /// Endpoint override (LocalStack, VPC endpoint). Default: None.
    pub endpoint_url: Option<String>,

    /// Additional OCR attempts for a failing page within one run. Default: 0.
    ///
    /// With the default a failed page is simply left for the next run. Any
    /// value keeps the guarantee that one page's failure never aborts a run.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted sources.
    pub password: Option<String>,

    /// Placement of the invisible text layer.
    pub overlay: OverlayStyle,

    /// Receives per-page events from both stages.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input/document.pdf"),
            cache_dir: PathBuf::from("ocr_cache"),
            output_dir: PathBuf::from("output"),
            output_pdf: None,
            output_markdown: None,
            dpi: 350,
            max_rendered_pixels: TEXTRACT_MAX_PIXELS,
            max_image_bytes: TEXTRACT_MAX_IMAGE_BYTES,
            throttle_ms: 150,
            region: "us-east-2".to_string(),
            endpoint_url: None,
            max_retries: 0,
            retry_backoff_ms: 500,
            password: None,
            overlay: OverlayStyle::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input", &self.input)
            .field("cache_dir", &self.cache_dir)
            .field("output_dir", &self.output_dir)
            .field("output_pdf", &self.output_pdf)
            .field("output_markdown", &self.output_markdown)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("throttle_ms", &self.throttle_ms)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("max_retries", &self.max_retries)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("overlay", &self.overlay)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Delay enforced between successful OCR calls.
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Resolved path of the searchable PDF.
    pub fn output_pdf_path(&self) -> PathBuf {
        self.output_pdf.clone().unwrap_or_else(|| {
            self.output_dir
                .join(format!("{}_searchable.pdf", input_stem(&self.input)))
        })
    }

    /// Resolved path of the Markdown transcript.
    pub fn output_markdown_path(&self) -> PathBuf {
        self.output_markdown
            .clone()
            .unwrap_or_else(|| self.output_dir.join(format!("{}.md", input_stem(&self.input))))
    }
}

fn input_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl fmt::Debug for PipelineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.fmt(f)
    }
}

impl PipelineConfigBuilder {
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input = path.into();
        self
    }

    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = path.into();
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = path.into();
        self
    }

    pub fn output_pdf(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_pdf = Some(path.into());
        self
    }

    pub fn output_markdown(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_markdown = Some(path.into());
        self
    }

    /// Set the DPI. Out-of-range values are rejected by [`Self::build`].
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_image_bytes(mut self, bytes: usize) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    pub fn throttle_ms(mut self, ms: u64) -> Self {
        self.config.throttle_ms = ms;
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_url = Some(url.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn overlay(mut self, style: OverlayStyle) -> Self {
        self.config.overlay = style;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, OcrPdfError> {
        let c = &self.config;
        if !(72..=600).contains(&c.dpi) {
            return Err(OcrPdfError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_image_bytes < 1024 {
            return Err(OcrPdfError::InvalidConfig(format!(
                "max_image_bytes must be at least 1024, got {}",
                c.max_image_bytes
            )));
        }
        if c.region.trim().is_empty() {
            return Err(OcrPdfError::InvalidConfig("AWS region must not be empty".into()));
        }
        if c.input.as_os_str().is_empty() {
            return Err(OcrPdfError::InvalidConfig("input path must not be empty".into()));
        }
        c.overlay.validate()?;
        Ok(self.config)
    }
}

// ── Overlay layout ───────────────────────────────────────────────────────

/// Fixed placement of the invisible text layer, in PDF points measured from
/// the top-left corner of the page.
///
/// Lines are stacked at `left_margin`, the first baseline at `top_offset`,
/// each following line `line_pitch` lower. Positions do not come from OCR
/// geometry: the layer is searchable and selectable in reading order, not
/// pixel-aligned with the scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// Distance of every line from the left edge. Default: 30 pt.
    pub left_margin: f32,
    /// Distance of the first baseline from the top edge. Default: 30 pt.
    pub top_offset: f32,
    /// Vertical distance between consecutive baselines. Default: 11 pt.
    pub line_pitch: f32,
    /// Font size of the text layer. Default: 8 pt.
    pub font_size: f32,
    /// Lowest baseline allowed, measured from the bottom edge. Default: 10 pt.
    ///
    /// A page with more lines than fit at `line_pitch` gets a tighter pitch
    /// so the last line still sits on the page.
    pub bottom_margin: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            left_margin: 30.0,
            top_offset: 30.0,
            line_pitch: 11.0,
            font_size: 8.0,
            bottom_margin: 10.0,
        }
    }
}

impl OverlayStyle {
    fn validate(&self) -> Result<(), OcrPdfError> {
        let fields = [
            ("left_margin", self.left_margin),
            ("top_offset", self.top_offset),
            ("line_pitch", self.line_pitch),
            ("font_size", self.font_size),
            ("bottom_margin", self.bottom_margin),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(OcrPdfError::InvalidConfig(format!(
                    "overlay {name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if self.font_size == 0.0 {
            return Err(OcrPdfError::InvalidConfig("overlay font_size must be > 0".into()));
        }
        Ok(())
    }
}
