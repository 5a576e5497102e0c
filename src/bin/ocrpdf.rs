//! CLI binary for edgequake-ocrpdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs a stage and prints its report.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_ocrpdf::{
    cache_status, run_build_stage, run_ocr_stage, BuildStageReport, CacheStatus, OcrStageReport,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, SkipReason, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per stage plus a log line per page
/// that did work (cached, assembled, failed or left out).
struct CliProgressCallback {
    bar: Mutex<ProgressBar>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(ProgressBar::hidden()),
            errors: AtomicUsize::new(0),
        })
    }

    fn bar(&self) -> ProgressBar {
        self.bar
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|_| ProgressBar::hidden())
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let bar = ProgressBar::new(total_pages as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix(match stage {
            Stage::Ocr => "OCR",
            Stage::Build => "Build",
        });
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{stage} stage: {total_pages} pages…"))
        ));
        self.errors.store(0, Ordering::SeqCst);
        if let Ok(mut slot) = self.bar.lock() {
            *slot = bar;
        }
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar().set_message(format!("page {page_num}"));
    }

    fn on_page_cached(&self, page_num: usize, total: usize, line_count: usize) {
        let bar = self.bar();
        bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{line_count:>4} lines")),
        ));
        bar.inc(1);
    }

    fn on_page_assembled(&self, _page_num: usize, _total: usize, _line_count: usize) {
        self.bar().inc(1);
    }

    fn on_page_skipped(&self, page_num: usize, total: usize, reason: SkipReason) {
        let bar = self.bar();
        let note = match reason {
            SkipReason::AlreadyCached => None,
            SkipReason::MissingCacheEntry => Some("no cached OCR result, left out"),
            SkipReason::UnreadableCacheEntry => Some("cache entry unreadable, left out"),
        };
        if let Some(note) = note {
            bar.println(format!(
                "  {} Page {:>3}/{:<3}  {}",
                yellow("–"),
                page_num,
                total,
                yellow(note),
            ));
        }
        bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        let bar = self.bar();
        bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
        bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        self.bar().finish_and_clear();
        let missing = total_pages.saturating_sub(success_count);
        if missing == 0 {
            eprintln!(
                "{} {} stage: {} pages done",
                green("✔"),
                stage,
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {} stage: {}/{} pages  ({} {})",
                cyan("⚠"),
                stage,
                bold(&success_count.to_string()),
                total_pages,
                red(&missing.to_string()),
                match stage {
                    Stage::Ocr => "uncached",
                    Stage::Build => "left out",
                },
            );
        }
    }
}

const AFTER_HELP: &str = r###"EXAMPLES:
  # OCR every uncached page, then build both outputs
  ocrpdf run input/bylaws.pdf

  # OCR only (safe to interrupt and re-run; cached pages are skipped)
  ocrpdf ocr input/bylaws.pdf --cache-dir ocr_cache

  # Build outputs from whatever is cached so far
  ocrpdf build input/bylaws.pdf --output-dir output

  # Which pages still need OCR?
  ocrpdf status input/bylaws.pdf --json

  # Force re-OCR of page 7
  rm ocr_cache/page_007.json && ocrpdf ocr input/bylaws.pdf

OUTPUTS:
  <output-dir>/<stem>_searchable.pdf   page images + invisible text layer
  <output-dir>/<stem>.md               "## Page N" section per cached page

ENVIRONMENT VARIABLES:
  AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY / AWS_PROFILE
                          Standard AWS credential chain for Textract
  OCRPDF_REGION           Textract region (default us-east-2)
  OCRPDF_ENDPOINT_URL     Endpoint override (LocalStack, VPC endpoint)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides -v / -q
"###;

/// OCR scanned PDFs with AWS Textract into searchable PDFs and Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "ocrpdf",
    version,
    about = "OCR scanned PDFs with AWS Textract into a searchable PDF and a Markdown transcript",
    long_about = "Two resumable stages share an on-disk cache of OCR results. \
`ocr` renders each uncached page and stores Textract's response; `build` turns \
whatever is cached into a searchable PDF (page image + invisible text) and a \
Markdown file. Both can be re-run at any time.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCRPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCRPDF_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "OCRPDF_NO_PROGRESS")]
    no_progress: bool,

    /// Print the stage report as JSON on stdout.
    #[arg(long, global = true, env = "OCRPDF_JSON")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render and OCR every page that has no cache entry yet.
    Ocr(StageArgs),
    /// Assemble the searchable PDF and Markdown from the cache.
    Build(StageArgs),
    /// `ocr` followed by `build`.
    Run(StageArgs),
    /// Show which pages are cached, missing, or stray.
    Status(CommonArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Source PDF.
    #[arg(env = "OCRPDF_INPUT")]
    input: PathBuf,

    /// Directory of per-page OCR results.
    #[arg(long, env = "OCRPDF_CACHE_DIR", default_value = "ocr_cache")]
    cache_dir: PathBuf,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCRPDF_PASSWORD")]
    password: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct StageArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory for the searchable PDF and Markdown.
    #[arg(long, env = "OCRPDF_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Searchable PDF path (default: <output-dir>/<stem>_searchable.pdf).
    #[arg(long, env = "OCRPDF_OUTPUT_PDF")]
    output_pdf: Option<PathBuf>,

    /// Markdown path (default: <output-dir>/<stem>.md).
    #[arg(long, env = "OCRPDF_OUTPUT_MD")]
    output_md: Option<PathBuf>,

    /// Rendering DPI (72–600), used by both stages.
    #[arg(long, env = "OCRPDF_DPI", default_value_t = 350,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Cap on the longest rendered edge, in pixels.
    #[arg(long, env = "OCRPDF_MAX_PIXELS", default_value_t = 10_000)]
    max_pixels: u32,

    /// Largest image sent to Textract, in bytes (PNG, else JPEG).
    #[arg(long, env = "OCRPDF_MAX_IMAGE_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_image_bytes: usize,

    /// Minimum delay between successful OCR calls, in milliseconds.
    #[arg(long, env = "OCRPDF_THROTTLE_MS", default_value_t = 150)]
    throttle_ms: u64,

    /// AWS region of the Textract endpoint.
    #[arg(long, env = "OCRPDF_REGION", default_value = "us-east-2")]
    region: String,

    /// Textract endpoint override.
    #[arg(long, env = "OCRPDF_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Extra OCR attempts for a failing page within one run.
    #[arg(long, env = "OCRPDF_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// First retry delay in milliseconds, doubled per attempt.
    #[arg(long, env = "OCRPDF_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Exit non-zero when a page failed OCR or was left out of the outputs.
    #[arg(long, env = "OCRPDF_STRICT")]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let mut strict_failure = false;

    match &cli.command {
        Command::Ocr(args) => {
            let config = build_config(args, progress)?;
            let report = run_ocr_stage(&config).await.context("OCR stage failed")?;
            print_ocr_report(&cli, &report)?;
            strict_failure = args.strict && !report.failed.is_empty();
        }
        Command::Build(args) => {
            let config = build_config(args, progress)?;
            let report = run_build_stage(&config).await.context("Build stage failed")?;
            print_build_report(&cli, &report)?;
            strict_failure = args.strict && report.has_gaps();
        }
        Command::Run(args) => {
            let config = build_config(args, progress)?;
            let ocr = run_ocr_stage(&config).await.context("OCR stage failed")?;
            let build = run_build_stage(&config).await.context("Build stage failed")?;
            if cli.json {
                let both = serde_json::json!({ "ocr": ocr, "build": build });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&both).context("Failed to serialize report")?
                );
            } else {
                print_ocr_report(&cli, &ocr)?;
                print_build_report(&cli, &build)?;
            }
            strict_failure = args.strict && (!ocr.failed.is_empty() || build.has_gaps());
        }
        Command::Status(args) => {
            let mut builder = PipelineConfig::builder()
                .input(&args.input)
                .cache_dir(&args.cache_dir);
            if let Some(ref pwd) = args.password {
                builder = builder.password(pwd);
            }
            let config = builder.build().context("Invalid configuration")?;
            let status = cache_status(&config).context("Failed to read cache status")?;
            print_status(&cli, &status)?;
        }
    }

    if strict_failure {
        if !cli.quiet {
            eprintln!("{} --strict: not every page made it through", red("✘"));
        }
        std::process::exit(2);
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &StageArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .input(&args.common.input)
        .cache_dir(&args.common.cache_dir)
        .output_dir(&args.output_dir)
        .dpi(args.dpi)
        .max_rendered_pixels(args.max_pixels)
        .max_image_bytes(args.max_image_bytes)
        .throttle_ms(args.throttle_ms)
        .region(&args.region)
        .max_retries(args.max_retries)
        .retry_backoff_ms(args.retry_backoff_ms);

    if let Some(ref p) = args.output_pdf {
        builder = builder.output_pdf(p);
    }
    if let Some(ref p) = args.output_md {
        builder = builder.output_markdown(p);
    }
    if let Some(ref url) = args.endpoint_url {
        builder = builder.endpoint_url(url);
    }
    if let Some(ref pwd) = args.common.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_ocr_report(cli: &Cli, report: &OcrStageReport) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }
    eprintln!(
        "OCR: {} new, {} already cached, {} failed of {} pages in {}ms",
        report.newly_cached.len(),
        report.already_cached.len(),
        report.failed.len(),
        report.total_pages,
        report.duration_ms
    );
    if !report.failed.is_empty() {
        eprintln!(
            "  {} re-run `ocrpdf ocr` to retry pages {:?}",
            dim("hint:"),
            report.failed_pages()
        );
    }
    Ok(())
}

fn print_build_report(cli: &Cli, report: &BuildStageReport) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }
    eprintln!(
        "Build: {}/{} pages in {}ms  →  {}  {}",
        report.included.len(),
        report.total_pages,
        report.duration_ms,
        report.pdf_path.display(),
        report.markdown_path.display()
    );
    if report.has_gaps() {
        eprintln!("  {} pages without OCR: {:?}", yellow("gaps:"), report.gaps);
    }
    Ok(())
}

fn print_status(cli: &Cli, status: &CacheStatus) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(status).context("Failed to serialize status")?
        );
        return Ok(());
    }
    println!("Cache:     {}", status.cache_dir.display());
    println!("Pages:     {}", status.total_pages);
    println!("Cached:    {}", status.cached.len());
    println!("Missing:   {} {:?}", status.missing.len(), status.missing);
    if !status.stray.is_empty() {
        println!("Stray:     {:?}", status.stray);
    }
    Ok(())
}
