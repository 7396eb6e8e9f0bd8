//! PDF rasterisation: render pages to `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a thread
//! pool designed for blocking operations, so the Tokio workers never stall
//! during CPU-heavy rendering.
//!
//! ## Failure tiers
//!
//! An unopenable document is fatal ([`Pdf2SpeechError::DecodeFailure`]); a
//! single page that fails to render is logged and skipped, because one bad
//! page must never prevent the rest of a textbook from producing audio.

use crate::config::PipelineConfig;
use crate::error::Pdf2SpeechError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// One rasterised page, immutable once produced.
pub struct PageImage {
    /// 0-based page index within the source document.
    pub index: usize,
    /// The page pixels at the configured DPI.
    pub image: DynamicImage,
}

impl PageImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Document facts available without rendering any page.
#[derive(Debug, Clone)]
pub struct PdfInfo {
    pub page_count: usize,
    pub pdf_version: String,
}

/// Rasterise every page of a PDF at the configured DPI.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
/// Pages that fail to render are skipped with a warning; the returned
/// vector is page-ordered but may have gaps in `index`.
pub async fn render_pages(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<PageImage>, Pdf2SpeechError> {
    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;

    tokio::task::spawn_blocking(move || render_pages_blocking(&path, dpi))
        .await
        .map_err(|e| Pdf2SpeechError::Internal(format!("Render task panicked: {e}")))?
}

/// Bind to pdfium, preferring an explicit `PDFIUM_LIB_PATH` over the
/// system library.
fn bind_pdfium() -> Result<Pdfium, Pdf2SpeechError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2SpeechError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(pdf_path: &Path, dpi: u32) -> Result<Vec<PageImage>, Pdf2SpeechError> {
    let pdfium = bind_pdfium()?;

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| Pdf2SpeechError::DecodeFailure {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    // Points are 1/72 inch, so this scale factor renders at `dpi`.
    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

    let mut results = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page = match pages.get(idx as u16) {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping page {}: {:?}", idx, e);
                continue;
            }
        };

        let bitmap = match page.render_with_config(&render_config) {
            Ok(b) => b,
            Err(e) => {
                warn!("Skipping page {}: rasterisation failed: {:?}", idx, e);
                continue;
            }
        };

        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx, image.width(), image.height());

        results.push(PageImage { index: idx, image });
    }

    Ok(results)
}

/// Read document facts from a PDF without rendering pages.
pub async fn inspect_pdf(pdf_path: &Path) -> Result<PdfInfo, Pdf2SpeechError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || inspect_pdf_blocking(&path))
        .await
        .map_err(|e| Pdf2SpeechError::Internal(format!("Inspect task panicked: {e}")))?
}

/// Blocking implementation of document inspection.
fn inspect_pdf_blocking(pdf_path: &Path) -> Result<PdfInfo, Pdf2SpeechError> {
    let pdfium = bind_pdfium()?;

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| Pdf2SpeechError::DecodeFailure {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    Ok(PdfInfo {
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
