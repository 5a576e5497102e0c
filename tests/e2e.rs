//! End-to-end tests for edgequake-ocrpdf against a real pdfium library.
//!
//! Gated behind `E2E_ENABLED` so they do not run in CI unless explicitly
//! requested. The live Textract test additionally needs `E2E_TEXTRACT` and
//! AWS credentials.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use edgequake_ocrpdf::pipeline::engine::bind_pdfium;
use edgequake_ocrpdf::pipeline::overlay::{OverlayPage, PdfiumSink};
use edgequake_ocrpdf::pipeline::render::PdfiumSource;
use edgequake_ocrpdf::{
    cache_status, run_build_stage, run_ocr_stage, run_ocr_stage_with_provider, Block,
    FsPageCache, MockOcrProvider, OcrPdfError, OcrResponse, PageCache, PageSize, PageSource,
    PdfSink, PipelineConfig,
};
use image::{DynamicImage, Rgba, RgbaImage};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

/// Write an image-only ("scanned") PDF of `pages` letter-size pages.
fn write_scanned_pdf(path: &Path, pages: usize) {
    let pdfium = bind_pdfium().expect("pdfium must be available for e2e tests");
    let mut sink = PdfiumSink::new(&pdfium).unwrap();
    for page_num in 1..=pages {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            85,
            110,
            Rgba([250, 250, 245, 255]),
        ));
        sink.add_page(&OverlayPage {
            page_num,
            size: PageSize::letter(),
            image,
            lines: Vec::new(),
        })
        .unwrap();
    }
    std::fs::write(path, sink.finish().unwrap()).unwrap();
}

fn response(lines: &[&str]) -> OcrResponse {
    OcrResponse::from_blocks(lines.iter().map(|l| Block::line(*l)).collect())
}

fn page_texts(path: &Path) -> Vec<String> {
    let pdfium = bind_pdfium().unwrap();
    let doc = pdfium.load_pdf_from_file(path, None).unwrap();
    doc.pages()
        .iter()
        .map(|p| p.text().map(|t| t.all()).unwrap_or_default())
        .collect()
}

struct Workspace {
    _dir: tempfile::TempDir,
    input: PathBuf,
    config: PipelineConfig,
}

fn workspace(pages: usize) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bylaws.pdf");
    write_scanned_pdf(&input, pages);
    let config = PipelineConfig::builder()
        .input(&input)
        .cache_dir(dir.path().join("ocr_cache"))
        .output_dir(dir.path().join("output"))
        .dpi(72)
        .throttle_ms(0)
        .build()
        .unwrap();
    Workspace {
        _dir: dir,
        input,
        config,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_build_with_gap_produces_matching_outputs() {
    e2e_skip_unless_enabled!();
    let ws = workspace(3);
    let cache = FsPageCache::open(&ws.config.cache_dir).unwrap();
    cache.write(1, &response(&["ARTICLE I", "Name"])).unwrap();
    cache.write(3, &response(&["ARTICLE III", "Meetings"])).unwrap();

    let report = run_build_stage(&ws.config).await.unwrap();

    assert_eq!(report.included, vec![1, 3]);
    assert_eq!(report.gaps, vec![2]);

    let md = std::fs::read_to_string(&report.markdown_path).unwrap();
    assert_eq!(
        md,
        "## Page 1\n\nARTICLE I\nName\n\n## Page 3\n\nARTICLE III\nMeetings\n"
    );
    assert_eq!(report.pdf_path.file_name().unwrap(), "bylaws_searchable.pdf");

    let texts = page_texts(&report.pdf_path);
    assert_eq!(texts.len(), 2, "one output page per cached page");
    assert!(texts[0].contains("ARTICLE I"), "page 1 text: {:?}", texts[0]);
    assert!(texts[0].contains("Name"));
    assert!(texts[1].contains("Meetings"), "page 2 text: {:?}", texts[1]);
}

#[tokio::test]
async fn test_output_pages_keep_source_dimensions() {
    e2e_skip_unless_enabled!();
    let ws = workspace(1);
    let cache = FsPageCache::open(&ws.config.cache_dir).unwrap();
    cache.write(1, &response(&["only line"])).unwrap();

    let report = run_build_stage(&ws.config).await.unwrap();

    let pdfium = bind_pdfium().unwrap();
    let doc = pdfium.load_pdf_from_file(&report.pdf_path, None).unwrap();
    let page = doc.pages().get(0).unwrap();
    assert!((page.width().value - 612.0).abs() < 0.5);
    assert!((page.height().value - 792.0).abs() < 0.5);
}

#[tokio::test]
async fn test_text_layer_is_invisible_and_in_provider_order() {
    e2e_skip_unless_enabled!();
    let ws = workspace(1);
    let cache = FsPageCache::open(&ws.config.cache_dir).unwrap();
    cache
        .write(1, &response(&["ARTICLE I", "Name", "Purpose"]))
        .unwrap();

    let report = run_build_stage(&ws.config).await.unwrap();

    let pdfium = bind_pdfium().unwrap();
    let doc = pdfium.load_pdf_from_file(&report.pdf_path, None).unwrap();
    let page = doc.pages().get(0).unwrap();

    let mut texts = Vec::new();
    let mut images = 0;
    for object in page.objects().iter() {
        if object.as_image_object().is_some() {
            images += 1;
        }
        if let Some(text) = object.as_text_object() {
            assert_eq!(
                text.render_mode(),
                PdfPageTextRenderMode::Invisible,
                "text {:?} must not paint",
                text.text()
            );
            texts.push(text.text());
        }
    }
    assert_eq!(images, 1, "one full-page raster");
    assert_eq!(texts, vec!["ARTICLE I", "Name", "Purpose"]);
}

#[tokio::test]
async fn test_ocr_stage_with_mock_then_status() {
    e2e_skip_unless_enabled!();
    let ws = workspace(2);

    let provider = MockOcrProvider::new();
    let report = run_ocr_stage_with_provider(&ws.config, &provider).await.unwrap();
    assert_eq!(report.newly_cached, vec![1, 2]);
    assert!(ws.config.cache_dir.join("page_001.json").is_file());
    assert!(ws.config.cache_dir.join("page_002.json").is_file());

    let again = run_ocr_stage_with_provider(&ws.config, &MockOcrProvider::new())
        .await
        .unwrap();
    assert_eq!(again.already_cached, vec![1, 2]);

    let status = cache_status(&ws.config).unwrap();
    assert!(status.is_complete());
    assert_eq!(status.cached, vec![1, 2]);
}

#[test]
fn test_source_opens_with_password_from_config() {
    e2e_skip_unless_enabled!();
    let ws = workspace(2);
    let config = PipelineConfig::builder()
        .input(&ws.input)
        .password("unused-for-plain-pdfs")
        .build()
        .unwrap();

    let pdfium = bind_pdfium().unwrap();
    let source = PdfiumSource::open(&pdfium, &config.input, config.password.as_deref()).unwrap();
    assert_eq!(source.page_count(), 2);
    assert!((source.page_size(1).unwrap().width - 612.0).abs() < 0.5);
}

#[tokio::test]
async fn test_not_a_pdf_is_fatal() {
    e2e_skip_unless_enabled!();
    let ws = workspace(1);
    std::fs::write(&ws.input, b"plain text, not a pdf").unwrap();

    let err = run_build_stage(&ws.config).await.unwrap_err();
    assert!(matches!(err, OcrPdfError::NotAPdf { .. }), "got {err:?}");
    assert!(!ws.config.output_pdf_path().exists());
}

#[tokio::test]
async fn test_live_textract() {
    e2e_skip_unless_enabled!();
    if std::env::var("E2E_TEXTRACT").is_err() {
        println!("SKIP: set E2E_TEXTRACT=1 (and AWS credentials) to call Textract");
        return;
    }
    let ws = workspace(1);

    let report = run_ocr_stage(&ws.config).await.unwrap();
    assert_eq!(report.total_pages, 1);
    assert!(
        report.failed.is_empty(),
        "Textract call failed: {:?}",
        report.failed
    );

    let cache = FsPageCache::open_existing(&ws.config.cache_dir);
    let entry = cache.read(1).unwrap();
    assert!(!entry.blocks.is_empty(), "Textract always returns a PAGE block");
}
