//! Integration tests for both stages, driven entirely in memory.
//!
//! The page source, cache, OCR provider and PDF sink are all test doubles,
//! so these run without pdfium, AWS credentials or network access.

use edgequake_ocrpdf::pipeline::ocr::OcrError;
use edgequake_ocrpdf::pipeline::render::raster_dimensions;
use edgequake_ocrpdf::{
    assemble, run_ocr_pages, Block, BlockType, FsPageCache, MemoryPageCache, MockOcrProvider,
    OcrPdfError, OcrResponse, PageCache, PageError, PageSize, PageSource, PipelineConfig,
    PipelineProgressCallback, RecordingSink, SkipReason, Stage,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// A document of `n` small pages; pages in `broken` fail to render.
struct FakeDocument {
    sizes: Vec<PageSize>,
    broken: HashSet<usize>,
}

impl FakeDocument {
    fn new(n: usize) -> Self {
        Self {
            sizes: vec![PageSize::new(144.0, 180.0); n],
            broken: HashSet::new(),
        }
    }

    fn with_broken_page(mut self, page: usize) -> Self {
        self.broken.insert(page);
        self
    }
}

impl PageSource for FakeDocument {
    fn page_count(&self) -> usize {
        self.sizes.len()
    }

    fn page_size(&self, page_num: usize) -> Result<PageSize, OcrPdfError> {
        self.sizes
            .get(page_num.wrapping_sub(1))
            .copied()
            .ok_or(OcrPdfError::PageOutOfRange {
                page: page_num,
                total: self.sizes.len(),
            })
    }

    fn render(&self, page_num: usize, dpi: u32, max_pixels: u32) -> Result<DynamicImage, OcrPdfError> {
        let size = self.page_size(page_num)?;
        if self.broken.contains(&page_num) {
            return Err(OcrPdfError::RasterisationFailed {
                page: page_num,
                detail: "simulated bitmap failure".into(),
            });
        }
        let (w, h) = raster_dimensions(size, dpi, max_pixels);
        let shade = (page_num * 40 % 256) as u8;
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            w,
            h,
            Rgba([shade, shade, shade, 255]),
        )))
    }
}

fn response(lines: &[&str]) -> OcrResponse {
    OcrResponse::from_blocks(lines.iter().map(|l| Block::line(*l)).collect())
}

fn line_texts(resp: &OcrResponse) -> Vec<String> {
    resp.lines().into_iter().map(|l| l.text).collect()
}

fn config() -> PipelineConfig {
    PipelineConfig::builder()
        .dpi(72)
        .throttle_ms(0)
        .build()
        .unwrap()
}

/// Mock that answers `page <call+1>`: with pages visited in order and no
/// skips, call `i` belongs to page `i + 1`.
fn page_numbering_provider() -> MockOcrProvider {
    MockOcrProvider::from_fn(|call, _| Ok(response(&[format!("page {} text", call + 1).as_str()])))
}

// ── OCR stage ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_stage_caches_every_page() {
    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();
    let provider = page_numbering_provider();

    let report = run_ocr_pages(&doc, &cache, &provider, &config()).await.unwrap();

    assert_eq!(report.total_pages, 3);
    assert_eq!(report.newly_cached, vec![1, 2, 3]);
    assert!(report.failed.is_empty());
    assert!(report.is_complete());
    assert_eq!(provider.call_count(), 3);
    assert_eq!(line_texts(&cache.read(2).unwrap()), vec!["page 2 text"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ocr_stage_runs_on_a_multi_thread_runtime() {
    let doc = FakeDocument::new(2).with_broken_page(2);
    let cache = MemoryPageCache::new();
    let provider = page_numbering_provider();

    let report = run_ocr_pages(&doc, &cache, &provider, &config()).await.unwrap();

    assert_eq!(report.newly_cached, vec![1]);
    assert_eq!(report.failed_pages(), vec![2]);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn second_run_makes_no_provider_calls() {
    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();

    let first = page_numbering_provider();
    run_ocr_pages(&doc, &cache, &first, &config()).await.unwrap();
    let snapshot: Vec<OcrResponse> = (1..=3).map(|p| cache.read(p).unwrap()).collect();

    let second = page_numbering_provider();
    let report = run_ocr_pages(&doc, &cache, &second, &config()).await.unwrap();

    assert_eq!(second.call_count(), 0);
    assert!(report.newly_cached.is_empty());
    assert_eq!(report.already_cached, vec![1, 2, 3]);
    let after: Vec<OcrResponse> = (1..=3).map(|p| cache.read(p).unwrap()).collect();
    assert_eq!(snapshot, after);
}

#[tokio::test]
async fn rerun_only_ocrs_missing_pages() {
    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();
    cache.insert(1, response(&["one"]));
    cache.insert(3, response(&["three"]));

    let provider = MockOcrProvider::new().with_script(vec![Ok(response(&["two"]))]);
    let report = run_ocr_pages(&doc, &cache, &provider, &config()).await.unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_eq!(report.newly_cached, vec![2]);
    assert_eq!(report.already_cached, vec![1, 3]);
    assert_eq!(line_texts(&cache.read(1).unwrap()), vec!["one"]);
    assert_eq!(line_texts(&cache.read(2).unwrap()), vec!["two"]);
    assert_eq!(line_texts(&cache.read(3).unwrap()), vec!["three"]);
}

#[tokio::test]
async fn failed_page_is_skipped_and_retried_next_run() {
    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();

    let provider = MockOcrProvider::new().with_script(vec![
        Ok(response(&["one"])),
        Err(OcrError::Throttled("ThrottlingException: Rate exceeded".into())),
        Ok(response(&["three"])),
    ]);
    let report = run_ocr_pages(&doc, &cache, &provider, &config()).await.unwrap();

    assert_eq!(report.newly_cached, vec![1, 3]);
    assert_eq!(report.failed_pages(), vec![2]);
    assert!(matches!(report.failed[0], PageError::OcrFailed { page: 2, .. }));
    assert!(!cache.has(2));

    let retry = MockOcrProvider::new().with_script(vec![Ok(response(&["two"]))]);
    let report = run_ocr_pages(&doc, &cache, &retry, &config()).await.unwrap();
    assert_eq!(retry.call_count(), 1);
    assert_eq!(report.newly_cached, vec![2]);
    assert!(report.is_complete());
}

#[tokio::test]
async fn render_failure_does_not_stop_the_run() {
    let doc = FakeDocument::new(3).with_broken_page(2);
    let cache = MemoryPageCache::new();
    let provider = MockOcrProvider::new();

    let report = run_ocr_pages(&doc, &cache, &provider, &config()).await.unwrap();

    assert_eq!(report.newly_cached, vec![1, 3]);
    assert!(matches!(report.failed[0], PageError::RenderFailed { page: 2, .. }));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn successful_calls_respect_the_throttle() {
    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();
    let provider = MockOcrProvider::new();
    let config = PipelineConfig::builder()
        .dpi(72)
        .throttle_ms(30)
        .build()
        .unwrap();

    run_ocr_pages(&doc, &cache, &provider, &config).await.unwrap();

    let calls = provider.call_instants();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(30));
    }
}

#[tokio::test]
async fn bounded_retry_recovers_within_one_run() {
    let doc = FakeDocument::new(1);
    let cache = MemoryPageCache::new();
    let provider = MockOcrProvider::new().with_script(vec![
        Err(OcrError::Transport("connection reset".into())),
        Ok(response(&["second try"])),
    ]);
    let config = PipelineConfig::builder()
        .dpi(72)
        .throttle_ms(0)
        .max_retries(1)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let report = run_ocr_pages(&doc, &cache, &provider, &config).await.unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(report.newly_cached, vec![1]);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn filesystem_cache_is_byte_identical_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FsPageCache::open(dir.path().join("ocr_cache")).unwrap();
    let doc = FakeDocument::new(2);

    run_ocr_pages(&doc, &cache, &page_numbering_provider(), &config())
        .await
        .unwrap();
    let before: Vec<Vec<u8>> = (1..=2)
        .map(|p| std::fs::read(cache.entry_path(p)).unwrap())
        .collect();

    // A provider that would return different text must never be consulted.
    let other = MockOcrProvider::from_fn(|_, _| Ok(response(&["different"])));
    run_ocr_pages(&doc, &cache, &other, &config()).await.unwrap();

    let after: Vec<Vec<u8>> = (1..=2)
        .map(|p| std::fs::read(cache.entry_path(p)).unwrap())
        .collect();
    assert_eq!(other.call_count(), 0);
    assert_eq!(before, after);
    assert_eq!(cache.cached_pages().unwrap(), vec![1, 2]);
}

// ── Build stage ──────────────────────────────────────────────────────────────

#[test]
fn markdown_contains_only_line_blocks() {
    let doc = FakeDocument::new(1);
    let cache = MemoryPageCache::new();
    cache.insert(
        1,
        OcrResponse::from_blocks(vec![
            Block::line("Alpha"),
            Block::line("Beta"),
            Block::new(BlockType::from("OTHER"), "ignored"),
        ]),
    );
    let mut sink = RecordingSink::new();

    let assembly = assemble(&doc, &cache, &config(), &mut sink).unwrap();

    assert_eq!(assembly.markdown, "## Page 1\n\nAlpha\nBeta\n");
    let texts: Vec<&str> = sink.pages[0].lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["Alpha", "Beta"]);
}

#[test]
fn gaps_are_left_out_of_both_outputs() {
    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();
    cache.insert(1, response(&["first page"]));
    cache.insert(3, response(&["third page"]));
    let mut sink = RecordingSink::new();

    let assembly = assemble(&doc, &cache, &config(), &mut sink).unwrap();

    assert_eq!(
        assembly.markdown,
        "## Page 1\n\nfirst page\n\n## Page 3\n\nthird page\n"
    );
    assert!(!assembly.markdown.contains("## Page 2"));
    assert_eq!(sink.page_numbers(), vec![1, 3]);
    assert_eq!(assembly.included, vec![1, 3]);
    assert_eq!(assembly.gaps, vec![2]);
}

#[test]
fn text_layer_has_one_entry_per_line_in_order() {
    let doc = FakeDocument::new(1);
    let cache = MemoryPageCache::new();
    let texts = ["ARTICLE I", "Name", "The name of this association", "is Example."];
    let mut blocks = Vec::new();
    for t in texts {
        blocks.push(Block::line(t));
        for w in t.split_whitespace() {
            blocks.push(Block::word(w));
        }
    }
    cache.insert(1, OcrResponse::from_blocks(blocks));
    let mut sink = RecordingSink::new();

    assemble(&doc, &cache, &config(), &mut sink).unwrap();

    let page = &sink.pages[0];
    assert_eq!(page.lines.len(), texts.len());
    for (placed, expected) in page.lines.iter().zip(texts) {
        assert_eq!(placed.text, expected);
        assert!(placed.y >= 0.0 && placed.y <= page.size.height);
        assert!(placed.x >= 0.0 && placed.x <= page.size.width);
    }
    for pair in page.lines.windows(2) {
        assert!(pair[1].y < pair[0].y);
    }
}

#[test]
fn output_never_exceeds_document_page_count() {
    let doc = FakeDocument::new(2);
    let cache = MemoryPageCache::new();
    cache.insert(1, response(&["a"]));
    cache.insert(2, response(&["b"]));
    cache.insert(7, response(&["from another document"]));
    let mut sink = RecordingSink::new();

    let assembly = assemble(&doc, &cache, &config(), &mut sink).unwrap();

    assert_eq!(sink.page_numbers(), vec![1, 2]);
    assert!(!assembly.markdown.contains("another document"));
    assert!(assembly.included.iter().all(|p| (1..=2).contains(p)));
}

#[test]
fn page_raster_uses_configured_dpi_and_source_size() {
    let doc = FakeDocument::new(1);
    let cache = MemoryPageCache::new();
    cache.insert(1, response(&["x"]));
    let mut sink = RecordingSink::new();
    let config = PipelineConfig::builder().dpi(144).build().unwrap();

    assemble(&doc, &cache, &config, &mut sink).unwrap();

    let page = &sink.pages[0];
    assert_eq!(page.size, PageSize::new(144.0, 180.0));
    assert_eq!((page.image_width, page.image_height), (288, 360));
}

#[test]
fn corrupt_cache_entry_is_a_gap() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FsPageCache::open(dir.path()).unwrap();
    cache.write(1, &response(&["good"])).unwrap();
    std::fs::write(cache.entry_path(2), b"{\"Blocks\": [trunc").unwrap();
    let doc = FakeDocument::new(2);
    let mut sink = RecordingSink::new();

    let assembly = assemble(&doc, &cache, &config(), &mut sink).unwrap();

    assert_eq!(assembly.included, vec![1]);
    assert_eq!(assembly.gaps, vec![2]);
    assert_eq!(assembly.markdown, "## Page 1\n\ngood\n");
}

#[test]
fn corrupt_cache_entry_is_reported_as_unreadable() {
    let log = Arc::new(EventLog::default());
    let config = PipelineConfig::builder()
        .dpi(72)
        .progress_callback(log.clone() as Arc<dyn PipelineProgressCallback>)
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cache = FsPageCache::open(dir.path()).unwrap();
    std::fs::write(cache.entry_path(1), b"not json").unwrap();
    let doc = FakeDocument::new(2);
    let mut sink = RecordingSink::new();

    let (assembly, logs) =
        capture_warnings(|| assemble(&doc, &cache, &config, &mut sink).unwrap());

    assert_eq!(assembly.gaps, vec![1, 2]);
    let events = log.events.lock().unwrap().clone();
    assert!(events.contains(&"skipped 1 UnreadableCacheEntry".to_string()), "{events:?}");
    assert!(events.contains(&"skipped 2 MissingCacheEntry".to_string()), "{events:?}");
    assert!(logs.contains("Page 1: skipping, cache entry unreadable"), "{logs}");
    assert!(logs.contains("page_001.json"), "warning names the file: {logs}");
}

#[test]
fn empty_cache_builds_empty_outputs() {
    let doc = FakeDocument::new(2);
    let cache = MemoryPageCache::new();
    let mut sink = RecordingSink::new();

    let assembly = assemble(&doc, &cache, &config(), &mut sink).unwrap();

    assert!(assembly.markdown.is_empty());
    assert!(sink.pages.is_empty());
    assert_eq!(assembly.gaps, vec![1, 2]);
}

// ── Log capture ──────────────────────────────────────────────────────────────

/// Shared buffer the fmt subscriber writes into.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a WARN-level subscriber installed and return what it logged.
fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let text = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
    (out, text)
}

#[test]
fn each_gap_is_logged_with_its_page_number() {
    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();
    cache.insert(1, response(&["one"]));
    cache.insert(3, response(&["three"]));
    let mut sink = RecordingSink::new();

    let (assembly, logs) =
        capture_warnings(|| assemble(&doc, &cache, &config(), &mut sink).unwrap());

    assert_eq!(assembly.gaps, vec![2]);
    let warnings: Vec<&str> = logs.lines().filter(|l| l.contains("WARN")).collect();
    assert_eq!(warnings.len(), 1, "{logs}");
    assert!(
        warnings[0].contains("Page 2: no cached OCR result"),
        "warning names the page: {}",
        warnings[0]
    );
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    fn push(&self, e: String) {
        self.events.lock().unwrap().push(e);
    }
}

impl PipelineProgressCallback for EventLog {
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        self.push(format!("start {stage} {total_pages}"));
    }
    fn on_page_cached(&self, page_num: usize, _total: usize, line_count: usize) {
        self.push(format!("cached {page_num} {line_count}"));
    }
    fn on_page_assembled(&self, page_num: usize, _total: usize, line_count: usize) {
        self.push(format!("assembled {page_num} {line_count}"));
    }
    fn on_page_skipped(&self, page_num: usize, _total: usize, reason: SkipReason) {
        self.push(format!("skipped {page_num} {reason:?}"));
    }
    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.push(format!("error {page_num}"));
    }
    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        self.push(format!("done {stage} {success_count}/{total_pages}"));
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let log = Arc::new(EventLog::default());
    let config = PipelineConfig::builder()
        .dpi(72)
        .throttle_ms(0)
        .progress_callback(log.clone() as Arc<dyn PipelineProgressCallback>)
        .build()
        .unwrap();

    let doc = FakeDocument::new(3);
    let cache = MemoryPageCache::new();
    cache.insert(2, response(&["cached", "already"]));
    let provider = MockOcrProvider::new().with_script(vec![
        Ok(response(&["one"])),
        Err(OcrError::Service("InternalServerError".into())),
    ]);
    run_ocr_pages(&doc, &cache, &provider, &config).await.unwrap();

    let mut sink = RecordingSink::new();
    assemble(&doc, &cache, &config, &mut sink).unwrap();

    let events = log.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start OCR 3",
            "cached 1 1",
            "skipped 2 AlreadyCached",
            "error 3",
            "done OCR 2/3",
            "start build 3",
            "assembled 1 1",
            "assembled 2 2",
            "skipped 3 MissingCacheEntry",
            "done build 2/3",
        ]
    );
}
