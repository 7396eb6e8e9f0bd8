//! Region detection: ONNX model loading and raw box decoding.
//!
//! The detector is loaded **once**, eagerly, at pipeline start — weights,
//! session, and the ordered class-label list together — so a run either has
//! a fully working detector or aborts before any per-page cost is incurred.
//! After loading, the [`Detector`] is shared read-only across pages.
//!
//! Decoding deliberately over-generates: a candidate is emitted whenever its
//! class confidence clears the low emission threshold (default 0.05), far
//! below the display threshold applied later. Faint equation regions survive
//! to compete inside NMS clusters instead of being lost at the source.

use crate::config::PipelineConfig;
use crate::error::Pdf2SpeechError;
use crate::pipeline::render::PageImage;
use ndarray::{Array4, ArrayView2};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Axis-aligned box in page-pixel coordinates, corner-origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x_min = self.x.max(other.x);
        let y_min = self.y.max(other.y);
        let x_max = self.right().min(other.right());
        let y_max = self.bottom().min(other.bottom());

        if x_max <= x_min || y_max <= y_min {
            return 0.0;
        }

        let intersection = (x_max - x_min) * (y_max - y_min);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One candidate region emitted by the detector for a page.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    /// Index into the loaded class-label list; always valid by construction.
    pub class_id: usize,
    /// Class confidence in [0, 1].
    pub confidence: f32,
    /// Box in page-pixel coordinates.
    pub bbox: BoundingBox,
}

/// Ordered class-label list loaded from `classes.names`.
///
/// A detection's `class_id` is a 0-based index into this sequence; the
/// decoder never emits an index outside it.
#[derive(Debug, Clone)]
pub struct ClassLabels(Vec<String>);

impl ClassLabels {
    /// Load newline-separated labels, skipping blank lines.
    pub fn load(path: &Path) -> Result<Self, Pdf2SpeechError> {
        let raw = std::fs::read_to_string(path).map_err(|e| Pdf2SpeechError::ModelLoadFailure {
            model_dir: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            detail: format!("cannot read class labels '{}': {e}", path.display()),
        })?;

        let labels: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if labels.is_empty() {
            return Err(Pdf2SpeechError::ModelLoadFailure {
                model_dir: path.parent().unwrap_or(Path::new(".")).to_path_buf(),
                detail: format!("class label file '{}' is empty", path.display()),
            });
        }

        Ok(Self(labels))
    }

    pub fn from_vec(labels: Vec<String>) -> Self {
        Self(labels)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Label for a class id, if in range.
    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.0.get(class_id).map(String::as_str)
    }
}

/// The loaded detection model: ONNX session + class labels.
///
/// `Session::run` needs exclusive access, hence the mutex; everything else
/// is immutable after load. Detection is CPU-bound — callers run it inside
/// `spawn_blocking` alongside cropping and annotation.
#[derive(Debug)]
pub struct Detector {
    session: Mutex<Session>,
    labels: ClassLabels,
    input_name: String,
    output_name: String,
    input_size: u32,
    emission_threshold: f32,
}

impl Detector {
    /// Eagerly load `model.onnx` and `classes.names` from the model directory.
    ///
    /// Any missing or malformed artifact fails the whole run here, before a
    /// single page is rasterised.
    pub fn load(config: &PipelineConfig) -> Result<Self, Pdf2SpeechError> {
        let model_dir = &config.model_dir;
        let weights_path = model_dir.join("model.onnx");
        let labels_path = model_dir.join("classes.names");

        if !weights_path.exists() {
            return Err(Pdf2SpeechError::ModelLoadFailure {
                model_dir: model_dir.clone(),
                detail: format!("weights file not found: {}", weights_path.display()),
            });
        }

        let labels = ClassLabels::load(&labels_path)?;

        info!(
            "Loading detection model from {} ({} classes)",
            weights_path.display(),
            labels.len()
        );

        let session = Session::builder()
            .and_then(|b| b.with_log_level(LogLevel::Error))
            .and_then(|b| b.commit_from_file(&weights_path))
            .map_err(|e| Pdf2SpeechError::ModelLoadFailure {
                model_dir: model_dir.clone(),
                detail: format!("failed to create ONNX session: {e}"),
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| Pdf2SpeechError::ModelLoadFailure {
                model_dir: model_dir.clone(),
                detail: "model has no inputs".into(),
            })?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| Pdf2SpeechError::ModelLoadFailure {
                model_dir: model_dir.clone(),
                detail: "model has no outputs".into(),
            })?;

        Ok(Self {
            session: Mutex::new(session),
            labels,
            input_name,
            output_name,
            input_size: config.input_size,
            emission_threshold: config.emission_threshold,
        })
    }

    /// The ordered class-label list the model was trained with.
    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Run one forward pass over a page and decode all candidate boxes.
    pub fn detect(&self, page: &PageImage) -> Result<Vec<Detection>, Pdf2SpeechError> {
        let tensor = self.preprocess(page);
        let page_w = page.width() as f32;
        let page_h = page.height() as f32;

        let input = TensorRef::from_array_view(tensor.view())
            .map_err(|e| Pdf2SpeechError::Internal(format!("input tensor conversion: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Pdf2SpeechError::Internal("detector session lock poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| Pdf2SpeechError::Internal(format!("detector forward pass: {e}")))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| Pdf2SpeechError::Internal(format!("detector output extraction: {e}")))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let (rows, feature_dim) = match dims.as_slice() {
            // [batch, rows, features] with batch 1, or flat [rows, features]
            [1, n, d] | [n, d] => (*n, *d),
            other => {
                return Err(Pdf2SpeechError::Internal(format!(
                    "unexpected detector output shape {other:?}"
                )))
            }
        };

        if feature_dim != 5 + self.labels.len() {
            return Err(Pdf2SpeechError::Internal(format!(
                "detector output feature dim {} does not match 5 + {} classes",
                feature_dim,
                self.labels.len()
            )));
        }

        let view = ArrayView2::from_shape((rows, feature_dim), &data[..rows * feature_dim])
            .map_err(|e| Pdf2SpeechError::Internal(format!("detector output reshape: {e}")))?;

        let detections = decode_detections(
            view,
            self.labels.len(),
            self.emission_threshold,
            page_w,
            page_h,
        );
        debug!(
            "Page {}: {} candidates above emission threshold",
            page.index,
            detections.len()
        );
        Ok(detections)
    }

    /// Resize to the square model input, scale to [0,1], NCHW layout.
    fn preprocess(&self, page: &PageImage) -> Array4<f32> {
        let size = self.input_size;
        let resized = page
            .image
            .resize_exact(size, size, image::imageops::FilterType::Triangle)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        tensor
    }
}

/// Decode raw per-cell predictions into detection candidates.
///
/// Each row is `[cx, cy, w, h, objectness, class scores…]` with the box in
/// normalized [0,1] image fractions. The predicted class is the argmax of
/// the score vector and the candidate's confidence is that score; a row is
/// emitted only when the confidence clears `emission_threshold`. Center and
/// size are scaled by the page dimensions and converted to corner-origin.
pub fn decode_detections(
    rows: ArrayView2<'_, f32>,
    num_classes: usize,
    emission_threshold: f32,
    page_w: f32,
    page_h: f32,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for row in rows.rows() {
        let (class_id, confidence) = row
            .iter()
            .skip(5)
            .take(num_classes)
            .enumerate()
            .fold((0usize, 0.0f32), |(best_cls, best_score), (cls, &score)| {
                if score > best_score {
                    (cls, score)
                } else {
                    (best_cls, best_score)
                }
            });

        if confidence <= emission_threshold {
            continue;
        }

        let cx = row[0] * page_w;
        let cy = row[1] * page_h;
        let w = row[2] * page_w;
        let h = row[3] * page_h;

        detections.push(Detection {
            class_id,
            confidence,
            bbox: BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h),
        });
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn row(cx: f32, cy: f32, w: f32, h: f32, scores: &[f32]) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, 1.0];
        r.extend_from_slice(scores);
        r
    }

    #[test]
    fn below_emission_threshold_emits_nothing() {
        let data = row(0.5, 0.5, 0.2, 0.1, &[0.04, 0.01]);
        let rows = Array2::from_shape_vec((1, 7), data).unwrap();
        let out = decode_detections(rows.view(), 2, 0.05, 1000.0, 800.0);
        assert!(out.is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        // Exactly at the threshold is still rejected.
        let data = row(0.5, 0.5, 0.2, 0.1, &[0.05, 0.0]);
        let rows = Array2::from_shape_vec((1, 7), data).unwrap();
        let out = decode_detections(rows.view(), 2, 0.05, 1000.0, 800.0);
        assert!(out.is_empty());
    }

    #[test]
    fn decodes_class_and_scales_box() {
        let data = row(0.5, 0.5, 0.2, 0.25, &[0.1, 0.9]);
        let rows = Array2::from_shape_vec((1, 7), data).unwrap();
        let out = decode_detections(rows.view(), 2, 0.05, 1000.0, 800.0);
        assert_eq!(out.len(), 1);
        let d = &out[0];
        assert_eq!(d.class_id, 1);
        assert!((d.confidence - 0.9).abs() < 1e-6);
        assert!((d.bbox.x - 400.0).abs() < 1e-3); // 0.5*1000 - 200/2
        assert!((d.bbox.y - 300.0).abs() < 1e-3); // 0.5*800 - 200/2
        assert!((d.bbox.width - 200.0).abs() < 1e-3);
        assert!((d.bbox.height - 200.0).abs() < 1e-3);
    }

    #[test]
    fn every_emitted_class_id_is_in_range() {
        let mut data = Vec::new();
        for i in 0..4 {
            data.extend(row(0.5, 0.5, 0.1, 0.1, &[0.2 + i as f32 * 0.1, 0.3, 0.1]));
        }
        let rows = Array2::from_shape_vec((4, 8), data).unwrap();
        let out = decode_detections(rows.view(), 3, 0.05, 100.0, 100.0);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|d| d.class_id < 3));
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn labels_reject_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.names");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(ClassLabels::load(&path).is_err());
    }

    #[test]
    fn labels_skip_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.names");
        std::fs::write(&path, "Equation\n\nText\n").unwrap();
        let labels = ClassLabels::load(&path).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(0), Some("Equation"));
        assert_eq!(labels.get(1), Some("Text"));
        assert_eq!(labels.get(2), None);
    }
}
