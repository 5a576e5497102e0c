//! Stage drivers: the OCR stage and the build stage.
//!
//! The two stages are independent. Their only coupling is the cache
//! directory: the OCR stage fills it, the build stage reads it. Either can
//! be re-run at any time.
//!
//! Each driver comes in two layers:
//!
//! * `run_*_stage(config)`: opens the real collaborators (pdfium,
//!   filesystem cache, Textract) and aborts with [`OcrPdfError`] if any of
//!   them cannot be set up;
//! * `run_ocr_pages` / [`crate::assemble::assemble`]: the per-page loop
//!   over trait objects, used directly by tests with in-memory collaborators.
//!
//! Pages are processed strictly in increasing order, one at a time.

use crate::assemble::{assemble, Assembly, PdfSink};
use crate::cache::{FsPageCache, PageCache, WriteOutcome};
use crate::config::PipelineConfig;
use crate::error::{OcrPdfError, PageError};
use crate::output::{BuildStageReport, CacheStatus, OcrStageReport};
use crate::pipeline::encode::encode_page;
use crate::pipeline::engine::bind_pdfium;
use crate::pipeline::input::validate_source;
use crate::pipeline::ocr::{recognize_page, OcrProvider, TextractProvider, Throttle};
use crate::pipeline::overlay::PdfiumSink;
use crate::pipeline::render::{PageSource, PdfiumSource};
use crate::progress::{SkipReason, Stage};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

/// Per-page result of the OCR stage.
#[derive(Debug, Clone)]
pub enum OcrOutcome {
    /// Recognised and written to the cache.
    Cached { line_count: usize },
    /// An entry already existed; no provider call was made.
    AlreadyCached,
    /// Rendering, encoding, the OCR call or the cache write failed.
    Failed(PageError),
}

// ── OCR stage ────────────────────────────────────────────────────────────

/// Run the OCR stage against the configured PDF, cache and Textract.
///
/// # Errors
/// Fatal only: the source cannot be opened, pdfium cannot be bound, the
/// cache directory cannot be created, or the Textract client cannot be
/// built. Per-page failures are reported in [`OcrStageReport::failed`].
pub async fn run_ocr_stage(config: &PipelineConfig) -> Result<OcrStageReport, OcrPdfError> {
    validate_source(&config.input)?;
    let pdfium = bind_pdfium()?;
    let source = PdfiumSource::open(&pdfium, &config.input, config.password.as_deref())?;
    let cache = FsPageCache::open(&config.cache_dir)?;
    let provider = TextractProvider::new(config).await?;

    run_ocr_pages(&source, &cache, &provider, config).await
}

/// Run the OCR stage with a caller-supplied provider.
pub async fn run_ocr_stage_with_provider(
    config: &PipelineConfig,
    provider: &dyn OcrProvider,
) -> Result<OcrStageReport, OcrPdfError> {
    validate_source(&config.input)?;
    let pdfium = bind_pdfium()?;
    let source = PdfiumSource::open(&pdfium, &config.input, config.password.as_deref())?;
    let cache = FsPageCache::open(&config.cache_dir)?;

    run_ocr_pages(&source, &cache, provider, config).await
}

/// Visit every page of `source` once, OCR'ing the ones not yet cached.
pub async fn run_ocr_pages(
    source: &dyn PageSource,
    cache: &dyn PageCache,
    provider: &dyn OcrProvider,
    config: &PipelineConfig,
) -> Result<OcrStageReport, OcrPdfError> {
    let start = Instant::now();
    let total = source.page_count();
    let cb = config.progress_callback.as_ref();
    let mut throttle = Throttle::new(config.throttle());

    info!(
        "OCR stage: {} pages via {} (DPI {}, throttle {}ms)",
        total,
        provider.name(),
        config.dpi,
        config.throttle_ms
    );
    if let Some(cb) = cb {
        cb.on_stage_start(Stage::Ocr, total);
    }

    let mut report = OcrStageReport {
        input: config.input.clone(),
        cache_dir: config.cache_dir.clone(),
        total_pages: total,
        ..Default::default()
    };

    for page_num in 1..=total {
        if let Some(cb) = cb {
            cb.on_page_start(page_num, total);
        }

        match ocr_step(page_num, source, cache, provider, &mut throttle, config).await {
            OcrOutcome::Cached { line_count } => {
                info!("Page {}/{}: cached ({} lines)", page_num, total, line_count);
                report.newly_cached.push(page_num);
                if let Some(cb) = cb {
                    cb.on_page_cached(page_num, total, line_count);
                }
            }
            OcrOutcome::AlreadyCached => {
                debug!("Page {}/{}: already cached", page_num, total);
                report.already_cached.push(page_num);
                if let Some(cb) = cb {
                    cb.on_page_skipped(page_num, total, SkipReason::AlreadyCached);
                }
            }
            OcrOutcome::Failed(e) => {
                warn!("{}", e);
                if let Some(cb) = cb {
                    cb.on_page_error(page_num, total, &e.to_string());
                }
                report.failed.push(e);
            }
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "OCR stage complete: {} new, {} already cached, {} failed in {}ms",
        report.newly_cached.len(),
        report.already_cached.len(),
        report.failed.len(),
        report.duration_ms
    );
    if let Some(cb) = cb {
        cb.on_stage_complete(
            Stage::Ocr,
            total,
            report.newly_cached.len() + report.already_cached.len(),
        );
    }
    Ok(report)
}

/// Process one page of the OCR stage.
///
/// Never fails the run: every error becomes [`OcrOutcome::Failed`] and the
/// page stays uncached.
pub async fn ocr_step(
    page_num: usize,
    source: &dyn PageSource,
    cache: &dyn PageCache,
    provider: &dyn OcrProvider,
    throttle: &mut Throttle,
    config: &PipelineConfig,
) -> OcrOutcome {
    if cache.has(page_num) {
        return OcrOutcome::AlreadyCached;
    }

    let rendered = run_blocking(|| {
        source
            .render(page_num, config.dpi, config.max_rendered_pixels)
            .map(|img| encode_page(&img, config.max_image_bytes))
    });
    let encoded = match rendered {
        Ok(Ok(enc)) => enc,
        Err(e) => {
            return OcrOutcome::Failed(PageError::RenderFailed {
                page: page_num,
                detail: e.to_string(),
            })
        }
        Ok(Err(e)) => {
            return OcrOutcome::Failed(PageError::EncodeFailed {
                page: page_num,
                detail: e.to_string(),
            })
        }
    };
    debug!(
        "Page {}: {} bytes {:?} for OCR",
        page_num,
        encoded.bytes.len(),
        encoded.format
    );

    let response = match recognize_page(provider, page_num, &encoded.bytes, throttle, config).await {
        Ok(r) => r,
        Err(e) => return OcrOutcome::Failed(e),
    };

    match cache.write(page_num, &response) {
        Ok(WriteOutcome::Written) => OcrOutcome::Cached {
            line_count: response.line_count(),
        },
        Ok(WriteOutcome::AlreadyPresent) => OcrOutcome::AlreadyCached,
        Err(e) => OcrOutcome::Failed(PageError::CacheWriteFailed {
            page: page_num,
            detail: e.to_string(),
        }),
    }
}

// ── Build stage ──────────────────────────────────────────────────────────

/// Run the build stage: cached results → Markdown + searchable PDF.
///
/// Both output files are written only after every page was visited. Both
/// are staged as temp files before either is renamed into place, so a
/// failed write leaves the previous outputs untouched.
pub async fn run_build_stage(config: &PipelineConfig) -> Result<BuildStageReport, OcrPdfError> {
    let start = Instant::now();
    let (assembly, pdf_bytes, total) = run_blocking(|| build_in_memory(config))?;

    let markdown_path = config.output_markdown_path();
    let pdf_path = config.output_pdf_path();
    write_outputs_atomic(&[
        (pdf_path.as_path(), pdf_bytes.as_slice()),
        (markdown_path.as_path(), assembly.markdown.as_bytes()),
    ])
    .await?;

    let report = BuildStageReport {
        input: config.input.clone(),
        total_pages: total,
        markdown_bytes: assembly.markdown.len(),
        pdf_bytes: pdf_bytes.len(),
        included: assembly.included,
        gaps: assembly.gaps,
        markdown_path,
        pdf_path,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Build stage complete: {} pages → {} and {} in {}ms",
        report.included.len(),
        report.pdf_path.display(),
        report.markdown_path.display(),
        report.duration_ms
    );
    Ok(report)
}

/// Run synchronous pdfium work from inside the async drivers.
///
/// `spawn_blocking` is not an option: pdfium documents borrow the bindings
/// and cannot be moved to another task. On a multi-thread runtime the worker
/// is handed off with `block_in_place`. On a current-thread runtime the
/// strictly sequential page loop has nothing else to run, so it just blocks.
pub(crate) fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// Everything pdfium touches happens here, before any await.
fn build_in_memory(config: &PipelineConfig) -> Result<(Assembly, Vec<u8>, usize), OcrPdfError> {
    validate_source(&config.input)?;
    let pdfium = bind_pdfium()?;
    let source = PdfiumSource::open(&pdfium, &config.input, config.password.as_deref())?;
    let cache = FsPageCache::open_existing(&config.cache_dir);
    let mut sink = PdfiumSink::new(&pdfium)?;

    let assembly = assemble(&source, &cache, config, &mut sink)?;
    let pdf_bytes = sink.finish()?;
    Ok((assembly, pdf_bytes, source.page_count()))
}

/// Write `bytes` to `path` through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OcrPdfError> {
    write_outputs_atomic(&[(path, bytes)]).await
}

/// Write several outputs so that none of them is replaced unless all of
/// them could be staged.
///
/// Every file is first written to `<name>.tmp` next to its target; only
/// then are the temp files renamed into place, in order. On any error the
/// temp files not yet renamed are removed.
pub async fn write_outputs_atomic(outputs: &[(&Path, &[u8])]) -> Result<(), OcrPdfError> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(outputs.len());

    for &(path, bytes) in outputs {
        match stage_temp(path, bytes).await {
            Ok(tmp_path) => staged.push((tmp_path, path)),
            Err(e) => {
                discard_temps(&staged).await;
                return Err(e);
            }
        }
    }

    for (i, (tmp_path, path)) in staged.iter().enumerate() {
        if let Err(e) = tokio::fs::rename(tmp_path, path).await {
            discard_temps(&staged[i..]).await;
            return Err(OcrPdfError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            });
        }
        debug!("Wrote {}", path.display());
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    path.with_file_name(tmp_name)
}

async fn stage_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf, OcrPdfError> {
    let write_err = |e: std::io::Error| OcrPdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = temp_path_for(path);
    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    debug!("Staged {} bytes → {}", bytes.len(), tmp_path.display());
    Ok(tmp_path)
}

async fn discard_temps(staged: &[(PathBuf, &Path)]) {
    for (tmp_path, _) in staged {
        if let Err(e) = tokio::fs::remove_file(tmp_path).await {
            warn!("Could not remove {}: {}", tmp_path.display(), e);
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────────

/// Report which pages of the configured PDF are cached.
///
/// Opens the source only to learn its page count; never creates the cache
/// directory.
pub fn cache_status(config: &PipelineConfig) -> Result<CacheStatus, OcrPdfError> {
    validate_source(&config.input)?;
    let pdfium = bind_pdfium()?;
    let source = PdfiumSource::open(&pdfium, &config.input, config.password.as_deref())?;
    let cache = FsPageCache::open_existing(&config.cache_dir);
    cache_status_of(source.page_count(), &cache, &config.cache_dir)
}

/// Coverage of `cache` for a `total_pages` document.
pub fn cache_status_of(
    total_pages: usize,
    cache: &dyn PageCache,
    cache_dir: &Path,
) -> Result<CacheStatus, OcrPdfError> {
    let entries = cache.cached_pages()?;
    Ok(CacheStatus::from_cached(
        cache_dir.to_path_buf(),
        total_pages,
        &entries,
    ))
}
