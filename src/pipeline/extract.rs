//! Region extraction: crop surviving boxes, persist them by class, and
//! draw the annotated page overview.
//!
//! Crops land under `<crops_dir>/<class-label>/` with a filename embedding
//! class label, page index, region ordinal, and the source page image name,
//! so every artifact is self-describing when debugging a bad recognition.
//! Routing downstream is by the in-memory class label on each
//! [`RegionArtifact`] — the directory layout is kept for compatibility with
//! external consumers, never re-listed to drive the pipeline.
//!
//! The annotated overview (hollow box + `label: confidence` text per
//! region, resized to a fixed display size) is a courtesy output for
//! sighted helpers checking what the detector saw.

use crate::config::PipelineConfig;
use crate::error::Pdf2SpeechError;
use crate::pipeline::detect::{ClassLabels, Detection};
use crate::pipeline::render::PageImage;
use ab_glyph::{FontVec, PxScale};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed display size of the annotated page overview.
const DISPLAY_SIZE: (u32, u32) = (960, 520);

/// Per-class box colors, cycled by class id.
const PALETTE: [Rgb<u8>; 6] = [
    Rgb([220, 40, 40]),
    Rgb([40, 160, 40]),
    Rgb([40, 80, 220]),
    Rgb([200, 160, 20]),
    Rgb([160, 40, 200]),
    Rgb([20, 170, 170]),
];

/// One persisted crop, routed by its in-memory class label.
#[derive(Debug, Clone)]
pub struct RegionArtifact {
    pub class_label: String,
    pub page_index: usize,
    pub path: PathBuf,
}

/// Everything the extractor produced for one page.
#[derive(Debug)]
pub struct PageSegments {
    /// Path of the annotated overview image.
    pub annotated_page: PathBuf,
    /// Crops in suppression order; may be shorter than the survivor list
    /// when zero-area boxes were skipped.
    pub artifacts: Vec<RegionArtifact>,
}

/// Crop and persist every surviving box of a page, then write the
/// annotated overview image.
///
/// `page_path` is the temp raster the page was saved under; its file name
/// is embedded in crop names. Zero-area crops (possible after clamping)
/// are logged and skipped, never an error.
pub fn extract_regions(
    page: &PageImage,
    page_path: &Path,
    survivors: &[Detection],
    labels: &ClassLabels,
    config: &PipelineConfig,
) -> Result<PageSegments, Pdf2SpeechError> {
    let page_rgb = page.image.to_rgb8();
    let page_stem = page_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page");

    let mut artifacts = Vec::with_capacity(survivors.len());
    let mut annotated = page_rgb.clone();
    let font = load_system_font();

    for (ordinal, det) in survivors.iter().enumerate() {
        let label = labels
            .get(det.class_id)
            .ok_or(Pdf2SpeechError::UnknownClassId {
                class_id: det.class_id,
                num_labels: labels.len(),
            })?;

        let x = det.bbox.x as u32;
        let y = det.bbox.y as u32;
        let w = det.bbox.width as u32;
        let h = det.bbox.height as u32;

        if w == 0 || h == 0 {
            warn!(
                "Page {}: skipping zero-area {} crop at ({}, {})",
                page.index, label, x, y
            );
            continue;
        }

        let class_dir = config.crops_dir.join(label);
        std::fs::create_dir_all(&class_dir).map_err(|e| Pdf2SpeechError::OutputWriteFailed {
            path: class_dir.clone(),
            source: e,
        })?;

        let crop = imageops::crop_imm(&page_rgb, x, y, w, h).to_image();
        let crop_path = class_dir.join(format!(
            "{label}_cropped_{page}_{ordinal}_{page_stem}.png",
            page = page.index
        ));
        crop.save(&crop_path)
            .map_err(|e| Pdf2SpeechError::OutputWriteFailed {
                path: crop_path.clone(),
                source: std::io::Error::other(e),
            })?;
        debug!("Saved {} crop: {}", label, crop_path.display());

        artifacts.push(RegionArtifact {
            class_label: label.to_string(),
            page_index: page.index,
            path: crop_path,
        });

        draw_region(&mut annotated, det, label, font.as_ref());
    }

    let annotated_page = write_overview(&annotated, config)?;

    Ok(PageSegments {
        annotated_page,
        artifacts,
    })
}

/// Remove the temp raster for a processed page. Absence is not an error.
pub fn cleanup_temp_page(page_path: &Path) {
    if let Err(e) = std::fs::remove_file(page_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove temp page {}: {}", page_path.display(), e);
        }
    }
}

/// Draw one region's box and caption onto the annotated page copy.
fn draw_region(canvas: &mut RgbImage, det: &Detection, label: &str, font: Option<&FontVec>) {
    let color = PALETTE[det.class_id % PALETTE.len()];
    let x = det.bbox.x as i32;
    let y = det.bbox.y as i32;
    let w = det.bbox.width as u32;
    let h = det.bbox.height as u32;

    // Two inset rectangles approximate a 2 px stroke.
    for inset in 0..2u32 {
        if w > 2 * inset && h > 2 * inset {
            let rect = Rect::at(x + inset as i32, y + inset as i32)
                .of_size(w - 2 * inset, h - 2 * inset);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    if let Some(font) = font {
        let caption = format!("{label}: {:.4}", det.confidence);
        let text_y = (y - 18).max(0);
        draw_text_mut(
            canvas,
            color,
            x,
            text_y,
            PxScale::from(16.0),
            font,
            &caption,
        );
    }
}

/// Resize the annotated page to the display size and write it.
fn write_overview(annotated: &RgbImage, config: &PipelineConfig) -> Result<PathBuf, Pdf2SpeechError> {
    std::fs::create_dir_all(&config.pages_dir).map_err(|e| Pdf2SpeechError::OutputWriteFailed {
        path: config.pages_dir.clone(),
        source: e,
    })?;

    let (dw, dh) = DISPLAY_SIZE;
    let resized = imageops::resize(annotated, dw, dh, imageops::FilterType::Triangle);

    let name = format!("output_image_{}.jpg", &Uuid::new_v4().simple().to_string()[..6]);
    let path = config.pages_dir.join(name);
    resized
        .save(&path)
        .map_err(|e| Pdf2SpeechError::OutputWriteFailed {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;

    Ok(path)
}

/// Try a handful of common system font locations for caption text.
///
/// Returns None when no font is available; captions are then skipped and
/// only the boxes are drawn.
fn load_system_font() -> Option<FontVec> {
    const CANDIDATES: [&str; 4] = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Helvetica.ttc",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];

    for path in CANDIDATES {
        if let Ok(bytes) = std::fs::read(path) {
            if let Ok(font) = FontVec::try_from_vec(bytes) {
                return Some(font);
            }
        }
    }
    None
}
