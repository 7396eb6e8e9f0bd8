//! Configuration types for the PDF-to-speech pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across threads, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::Pdf2SpeechError;
use crate::progress::RunProgressCallback;
use crate::services::{MarkupRecognizer, Reworder, SpeechSynthesizer};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one PDF-to-speech run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2speech::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(120)
///     .display_threshold(0.6)
///     .model_dir("segmentation/yolo-coco")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 50–400. Default: 90.
    ///
    /// 90 DPI keeps a textbook page around 750 × 1000 px — more than enough
    /// resolution for the 416 px detector input while keeping the per-page
    /// crop files small. Raise it when equation crops are fed to a
    /// recognition model that benefits from finer glyph detail.
    pub dpi: u32,

    /// Side length of the square detector input tensor in pixels. Default: 416.
    ///
    /// The detector was exported with a fixed 416 × 416 input; this is a
    /// property of the model artifact, not a tuning knob. Exposed so a
    /// re-exported model at 608 px can be dropped in without a code change.
    pub input_size: u32,

    /// Confidence floor at the detector-output stage. Default: 0.05.
    ///
    /// Deliberately loose: the detector over-generates candidates so that a
    /// faint equation never goes missing, and the display threshold below
    /// restores precision. The two thresholds are independent on purpose —
    /// collapsing them changes which regions survive suppression.
    pub emission_threshold: f32,

    /// Confidence floor applied before suppression. Default: 0.5.
    ///
    /// The second, stricter filter. Candidates between the two thresholds
    /// exist only to compete inside NMS clusters.
    pub display_threshold: f32,

    /// IoU above which two boxes are considered the same region. Default: 0.3.
    pub nms_iou_threshold: f32,

    /// Directory holding `model.onnx` and `classes.names`.
    /// Default: `segmentation/yolo-coco`, overridable via `MODEL_DIR`.
    pub model_dir: PathBuf,

    /// Base directory for class-partitioned region crops.
    /// Default: `static/cropped_images`.
    pub crops_dir: PathBuf,

    /// Directory for annotated page overview images.
    /// Default: `static/segmentated_images`.
    pub pages_dir: PathBuf,

    /// Directory for synthesized audio files. Default: `static/outputs`.
    pub audio_dir: PathBuf,

    /// Number of concurrent recognition-pipeline items per class folder. Default: 4.
    ///
    /// Recognition is network-bound (markup model, reword API, TTS), so a
    /// small amount of overlap cuts wall-clock time without hammering the
    /// services. Output order is reassembled to match input order.
    pub concurrency: usize,

    /// Maximum retry attempts on a transient reword-API failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, avoiding the
    /// thundering-herd problem when several regions retry at once.
    pub retry_backoff_ms: u64,

    /// Per-service-call timeout in seconds. Default: 60.
    ///
    /// A timed-out call takes the same sentinel-failure path as any other
    /// per-item error; it never aborts the run.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Model identifier for the rewording completion call.
    /// Default: `llama3-70b-8192`.
    pub reword_model: String,

    /// Base URL of the OpenAI-compatible completion endpoint.
    /// Default: `https://api.groq.com/openai/v1`.
    pub reword_api_base: String,

    /// API key for the rewording endpoint. If None, read from
    /// `GROQ_API_KEY` at pipeline start; missing both is a
    /// [`Pdf2SpeechError::ConfigurationError`].
    pub reword_api_key: Option<String>,

    /// URL of the markup-recognition (image → LaTeX) endpoint.
    /// Default: `http://127.0.0.1:8502/predict`.
    pub markup_endpoint: String,

    /// Pre-constructed markup recognizer. Takes precedence over
    /// `markup_endpoint`. Useful in tests or when the caller wraps the
    /// recognizer in custom middleware.
    pub recognizer: Option<Arc<dyn MarkupRecognizer>>,

    /// Pre-constructed rewording service. Takes precedence over the
    /// `reword_*` fields.
    pub reworder: Option<Arc<dyn Reworder>>,

    /// Pre-constructed speech synthesizer. Takes precedence over the
    /// built-in Google Translate TTS client.
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,

    /// Optional progress callback fired per page and per region.
    pub progress_callback: Option<Arc<dyn RunProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 90,
            input_size: 416,
            emission_threshold: 0.05,
            display_threshold: 0.5,
            nms_iou_threshold: 0.3,
            model_dir: std::env::var_os("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("segmentation/yolo-coco")),
            crops_dir: PathBuf::from("static/cropped_images"),
            pages_dir: PathBuf::from("static/segmentated_images"),
            audio_dir: PathBuf::from("static/outputs"),
            concurrency: 4,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            reword_model: "llama3-70b-8192".to_string(),
            reword_api_base: "https://api.groq.com/openai/v1".to_string(),
            reword_api_key: None,
            markup_endpoint: "http://127.0.0.1:8502/predict".to_string(),
            recognizer: None,
            reworder: None,
            synthesizer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("input_size", &self.input_size)
            .field("emission_threshold", &self.emission_threshold)
            .field("display_threshold", &self.display_threshold)
            .field("nms_iou_threshold", &self.nms_iou_threshold)
            .field("model_dir", &self.model_dir)
            .field("crops_dir", &self.crops_dir)
            .field("pages_dir", &self.pages_dir)
            .field("audio_dir", &self.audio_dir)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("reword_model", &self.reword_model)
            .field("reword_api_key", &self.reword_api_key.as_ref().map(|_| "<redacted>"))
            .field("markup_endpoint", &self.markup_endpoint)
            .field("recognizer", &self.recognizer.as_ref().map(|_| "<dyn MarkupRecognizer>"))
            .field("reworder", &self.reworder.as_ref().map(|_| "<dyn Reworder>"))
            .field("synthesizer", &self.synthesizer.as_ref().map(|_| "<dyn SpeechSynthesizer>"))
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
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(50, 400);
        self
    }

    pub fn input_size(mut self, px: u32) -> Self {
        self.config.input_size = px.max(32);
        self
    }

    pub fn emission_threshold(mut self, t: f32) -> Self {
        self.config.emission_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn display_threshold(mut self, t: f32) -> Self {
        self.config.display_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn nms_iou_threshold(mut self, t: f32) -> Self {
        self.config.nms_iou_threshold = t.clamp(0.0, 1.0);
        self
    }

    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    pub fn crops_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.crops_dir = dir.into();
        self
    }

    pub fn pages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pages_dir = dir.into();
        self
    }

    pub fn audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.audio_dir = dir.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn reword_model(mut self, model: impl Into<String>) -> Self {
        self.config.reword_model = model.into();
        self
    }

    pub fn reword_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.reword_api_base = base.into();
        self
    }

    pub fn reword_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.reword_api_key = Some(key.into());
        self
    }

    pub fn markup_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.markup_endpoint = url.into();
        self
    }

    pub fn recognizer(mut self, r: Arc<dyn MarkupRecognizer>) -> Self {
        self.config.recognizer = Some(r);
        self
    }

    pub fn reworder(mut self, r: Arc<dyn Reworder>) -> Self {
        self.config.reworder = Some(r);
        self
    }

    pub fn synthesizer(mut self, s: Arc<dyn SpeechSynthesizer>) -> Self {
        self.config.synthesizer = Some(s);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn RunProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2SpeechError> {
        let c = &self.config;
        if c.dpi < 50 || c.dpi > 400 {
            return Err(Pdf2SpeechError::InvalidConfig(format!(
                "DPI must be 50–400, got {}",
                c.dpi
            )));
        }
        if c.emission_threshold > c.display_threshold {
            return Err(Pdf2SpeechError::InvalidConfig(format!(
                "emission threshold ({}) must not exceed display threshold ({})",
                c.emission_threshold, c.display_threshold
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2SpeechError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_preserve_both_thresholds() {
        let c = PipelineConfig::default();
        assert_eq!(c.emission_threshold, 0.05);
        assert_eq!(c.display_threshold, 0.5);
        assert_eq!(c.nms_iou_threshold, 0.3);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = PipelineConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 50);
        let c = PipelineConfig::builder().dpi(9000).build().unwrap();
        assert_eq!(c.dpi, 400);
    }

    #[test]
    fn builder_rejects_inverted_thresholds() {
        let err = PipelineConfig::builder()
            .emission_threshold(0.9)
            .display_threshold(0.5)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn concurrency_floor_is_one() {
        let c = PipelineConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }
}
