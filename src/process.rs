//! Run orchestration: sequence the pipeline stages over a whole PDF.
//!
//! ## Fail-fast boundary
//!
//! Everything a run cannot recover from — unreadable input, missing or
//! corrupt detection model, absent service credentials — is checked here
//! **before** the first page is rasterised. Past that boundary every
//! failure is item-local: a bad page is skipped, a bad region gets
//! sentinel values, and the caller always receives whatever the rest of
//! the document produced.

use crate::config::PipelineConfig;
use crate::error::Pdf2SpeechError;
use crate::output::{RunOutput, RunStats};
use crate::pipeline::detect::Detector;
use crate::pipeline::extract::{cleanup_temp_page, extract_regions, PageSegments};
use crate::pipeline::recognize::{recognize_regions, RecognitionServices};
use crate::pipeline::render::PdfInfo;
use crate::pipeline::suppress::suppress;
use crate::pipeline::{input, render};
use crate::services::{GoogleTranslateTts, HttpMarkupRecognizer, OpenAiCompatReworder};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process a PDF into region images, recognized text, and spoken audio.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input_str` — Local file path or HTTP/HTTPS URL to a PDF
/// * `config` — Pipeline configuration
///
/// # Returns
/// `Ok(RunOutput)` on success, even if some pages or regions failed
/// (check `output.stats` and the sentinel markers in the sequences).
///
/// # Errors
/// Returns `Err(Pdf2SpeechError)` only for fatal errors:
/// - File not found / not a valid PDF
/// - Detection model missing or corrupt
/// - Rewording service credentials absent
pub async fn process(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2SpeechError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting run: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    // ── Step 2: Fail fast on model and credentials ───────────────────────
    let services = resolve_services(config)?;
    let detector = load_detector(config).await?;

    // ── Step 3: Rasterise pages ──────────────────────────────────────────
    let render_start = Instant::now();
    let pages = render::render_pages(&pdf_path, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    let total_pages = pages.len();
    info!("Rendered {} pages in {}ms", total_pages, render_duration_ms);

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total_pages);
    }

    // ── Step 4: Detect, suppress, and extract per page ───────────────────
    let segment_start = Instant::now();
    let temp_dir =
        tempfile::tempdir().map_err(|e| Pdf2SpeechError::Internal(format!("tempdir: {e}")))?;

    let mut annotated_pages = Vec::new();
    let mut artifacts = Vec::new();
    let mut skipped_pages = 0usize;

    for page in pages {
        let page_index = page.index;
        match segment_page(Arc::clone(&detector), page, temp_dir.path(), config).await {
            Ok(segments) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_segmented(page_index, total_pages, segments.artifacts.len());
                }
                annotated_pages.push(segments.annotated_page);
                artifacts.extend(segments.artifacts);
            }
            Err(e) => {
                warn!("Skipping page {}: {}", page_index, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_skipped(page_index, total_pages, &e.to_string());
                }
                skipped_pages += 1;
            }
        }
    }
    let segment_duration_ms = segment_start.elapsed().as_millis() as u64;
    info!(
        "Segmented {} pages into {} regions in {}ms",
        total_pages - skipped_pages,
        artifacts.len(),
        segment_duration_ms
    );

    // ── Step 5: Recognize regions, equations first ───────────────────────
    let recognize_start = Instant::now();
    let regions = recognize_regions(&artifacts, &services, config).await;
    let recognize_duration_ms = recognize_start.elapsed().as_millis() as u64;

    let failed_regions = regions
        .iter()
        .filter(|r| !(r.markup.is_recognized() && r.text.is_recognized() && r.audio.is_recognized()))
        .count();

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(regions.len(), failed_regions);
    }

    let stats = RunStats {
        total_pages,
        processed_pages: total_pages - skipped_pages,
        skipped_pages,
        total_regions: regions.len(),
        failed_regions,
        render_duration_ms,
        segment_duration_ms,
        recognize_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Run complete: {} regions ({} failed), {}ms total",
        stats.total_regions, stats.failed_regions, stats.total_duration_ms
    );

    Ok(RunOutput {
        annotated_pages,
        regions,
        stats,
    })
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<RunOutput, Pdf2SpeechError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2SpeechError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(process(input_str, config))
}

/// Read PDF facts without loading a model or touching any service.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<PdfInfo, Pdf2SpeechError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    render::inspect_pdf(resolved.path()).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Load the detection model on the blocking pool.
async fn load_detector(config: &PipelineConfig) -> Result<Arc<Detector>, Pdf2SpeechError> {
    let config = config.clone();
    let detector = tokio::task::spawn_blocking(move || Detector::load(&config))
        .await
        .map_err(|e| Pdf2SpeechError::Internal(format!("Model load task panicked: {e}")))??;
    Ok(Arc::new(detector))
}

/// Resolve the three recognition services, preferring pre-built objects
/// from the config over environment-driven construction.
///
/// The rewording credential is the only hard requirement: a pipeline that
/// cannot reword cannot produce usable audio, so a missing key aborts the
/// run here rather than failing every region later.
fn resolve_services(config: &PipelineConfig) -> Result<RecognitionServices, Pdf2SpeechError> {
    let recognizer = match &config.recognizer {
        Some(r) => Arc::clone(r),
        None => Arc::new(HttpMarkupRecognizer::new(config.markup_endpoint.clone())),
    };

    let reworder = match &config.reworder {
        Some(r) => Arc::clone(r),
        None => {
            let key = config
                .reword_api_key
                .clone()
                .or_else(|| std::env::var("GROQ_API_KEY").ok())
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    Pdf2SpeechError::ConfigurationError(
                        "GROQ_API_KEY is not set and no reworder was provided.\n\
                         Set the environment variable or inject a Reworder via the config builder."
                            .into(),
                    )
                })?;
            Arc::new(OpenAiCompatReworder::new(
                config.reword_api_base.clone(),
                key,
                config.reword_model.clone(),
            ))
        }
    };

    let synthesizer = match &config.synthesizer {
        Some(s) => Arc::clone(s),
        None => Arc::new(GoogleTranslateTts::default()),
    };

    Ok(RecognitionServices {
        recognizer,
        reworder,
        synthesizer,
    })
}

/// Detect, suppress, and extract one page on the blocking pool.
///
/// The page raster is saved as a temp PNG (its name is embedded in crop
/// filenames), consumed by detection and cropping, and removed before the
/// function returns — whether or not extraction succeeded.
async fn segment_page(
    detector: Arc<Detector>,
    page: render::PageImage,
    temp_root: &Path,
    config: &PipelineConfig,
) -> Result<PageSegments, Pdf2SpeechError> {
    let temp_path = temp_root.join(format!("image_{}.png", page.index));
    let config = config.clone();

    tokio::task::spawn_blocking(move || {
        let result = (|| {
            page.image
                .save(&temp_path)
                .map_err(|e| Pdf2SpeechError::OutputWriteFailed {
                    path: temp_path.clone(),
                    source: std::io::Error::other(e),
                })?;

            let candidates = detector.detect(&page)?;
            let survivors = suppress(candidates, page.width(), page.height(), &config);
            debug!(
                "Page {}: {} boxes survive suppression",
                page.index,
                survivors.len()
            );

            extract_regions(&page, &temp_path, &survivors, detector.labels(), &config)
        })();

        cleanup_temp_page(&temp_path);
        result
    })
    .await
    .map_err(|e| Pdf2SpeechError::Internal(format!("Segment task panicked: {e}")))?
}
