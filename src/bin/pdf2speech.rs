//! CLI binary for pdf2speech.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints the produced artifact lists.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2speech::{inspect, process, PipelineConfig, RunProgressCallback};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar across segmentation and recognition, with
/// per-page and per-region log lines. Region events arrive out of order
/// (concurrent recognition), so everything is counter-based.
struct CliProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl RunProgressCallback for CliProgress {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        self.bar.set_style(style);
        self.bar.set_prefix("Segmenting");
        self.bar.set_length(total_pages as u64);
        self.bar.set_message(String::new());
    }

    fn on_page_segmented(&self, page_index: usize, total_pages: usize, regions: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {} regions",
            green("✔"),
            page_index + 1,
            total_pages,
            regions
        ));
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, page_index: usize, total_pages: usize, detail: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_index + 1,
            total_pages,
            red(detail)
        ));
        self.bar.inc(1);
    }

    fn on_region_done(&self, completed: usize, total_regions: usize, ok: bool) {
        if completed == 1 {
            self.bar.set_prefix("Recognizing");
            self.bar.set_position(0);
            self.bar.set_length(total_regions as u64);
        }
        if !ok {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        self.bar.set_position(completed as u64);
    }

    fn on_run_complete(&self, total_regions: usize, failed_regions: usize) {
        self.bar.finish_and_clear();
        if failed_regions == 0 {
            eprintln!(
                "{} {} regions recognized successfully",
                green("✔"),
                bold(&total_regions.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} regions recognized  ({} failed)",
                if failed_regions == total_regions {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&(total_regions - failed_regions).to_string()),
                total_regions,
                red(&failed_regions.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic run: crops, annotated pages, and audio under ./static/
  pdf2speech textbook.pdf

  # Custom model directory and output roots
  pdf2speech --model-dir models/yolo-coco --crops-dir out/crops textbook.pdf

  # Higher rendering resolution, stricter display threshold
  pdf2speech --dpi 150 --display-threshold 0.6 textbook.pdf

  # Process a PDF straight from a URL
  pdf2speech https://example.com/chapter3.pdf

  # Inspect page count without a model or API key
  pdf2speech --inspect-only textbook.pdf

ENVIRONMENT VARIABLES:
  GROQ_API_KEY       Rewording completion API key (required unless injected)
  MODEL_DIR          Default detection-model directory
  PDFIUM_LIB_PATH    Path to an existing libpdfium
  RUST_LOG           Log filter, e.g. pdf2speech=debug

SETUP:
  1. Place model.onnx and classes.names in the model directory.
  2. Set the rewording key:  export GROQ_API_KEY=gsk_...
  3. Run:                    pdf2speech textbook.pdf
"#;

/// Turn scanned textbook PDFs into region images, text, and spoken audio.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2speech",
    version,
    about = "Turn scanned textbook PDFs into region images, text, and spoken audio",
    long_about = "Segment textbook pages into semantic regions (equations, text blocks, \
figures, tables) with an ONNX object detector, then recognize each region and synthesize \
audio so blind students can listen to the content.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Directory containing model.onnx and classes.names.
    #[arg(long, env = "MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Base directory for class-partitioned region crops.
    #[arg(long, default_value = "static/cropped_images")]
    crops_dir: PathBuf,

    /// Directory for annotated page overview images.
    #[arg(long, default_value = "static/segmentated_images")]
    pages_dir: PathBuf,

    /// Directory for synthesized audio files.
    #[arg(long, default_value = "static/outputs")]
    audio_dir: PathBuf,

    /// Rendering DPI (50–400).
    #[arg(long, default_value_t = 90,
          value_parser = clap::value_parser!(u32).range(50..=400))]
    dpi: u32,

    /// Confidence required for a region to survive suppression (0–1).
    #[arg(long, default_value_t = 0.5)]
    display_threshold: f32,

    /// Number of concurrent recognition calls per class group.
    #[arg(short, long, default_value_t = 4)]
    concurrency: usize,

    /// Per-service-call timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// URL of the markup-recognition endpoint.
    #[arg(long, default_value = "http://127.0.0.1:8502/predict")]
    markup_endpoint: String,

    /// Only print page count and PDF version, then exit.
    #[arg(long)]
    inspect_only: bool,

    /// Suppress the progress bar (log lines only).
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("inspect failed")?;
        println!("pages:       {}", info.page_count);
        println!("pdf_version: {}", info.pdf_version);
        return Ok(());
    }

    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .display_threshold(cli.display_threshold)
        .concurrency(cli.concurrency)
        .api_timeout_secs(cli.timeout)
        .crops_dir(cli.crops_dir)
        .pages_dir(cli.pages_dir)
        .audio_dir(cli.audio_dir)
        .markup_endpoint(cli.markup_endpoint);

    if let Some(dir) = cli.model_dir {
        builder = builder.model_dir(dir);
    }
    if !cli.quiet {
        builder = builder.progress_callback(CliProgress::new());
    }

    let config = builder.build().context("invalid configuration")?;
    let output = process(&cli.input, &config).await?;

    // ── Summary ──────────────────────────────────────────────────────────
    println!("{}", bold("Annotated pages:"));
    for page in &output.annotated_pages {
        println!("  {}", page.display());
    }

    println!("{}", bold("Regions:"));
    for region in &output.regions {
        let marker = if region.audio.is_recognized() {
            green("✔")
        } else {
            red("✗")
        };
        println!(
            "  {} [{}] {}",
            marker,
            region.class_label,
            region.source.display()
        );
        println!("      markup: {}", dim(region.markup.as_sentinel()));
        println!("      text:   {}", region.text.as_sentinel());
        println!("      audio:  {}", region.audio.as_sentinel());
    }

    let s = &output.stats;
    eprintln!(
        "{}",
        dim(&format!(
            "{} pages ({} skipped) · {} regions ({} failed) · render {}ms · segment {}ms · recognize {}ms",
            s.total_pages,
            s.skipped_pages,
            s.total_regions,
            s.failed_regions,
            s.render_duration_ms,
            s.segment_duration_ms,
            s.recognize_duration_ms,
        ))
    );

    Ok(())
}
