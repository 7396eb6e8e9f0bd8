//! Error types for the pdf2speech library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2SpeechError`] — **Fatal**: the run cannot proceed at all
//!   (bad input file, corrupt detection model, missing service credentials).
//!   Returned as `Err(Pdf2SpeechError)` from the top-level `process*`
//!   functions before any per-page work begins.
//!
//! * [`RegionError`] — **Non-fatal**: a single cropped region failed
//!   (unreadable crop, reword-API glitch, speech-synthesis error) but all
//!   other regions are fine. Stored inside [`crate::output::RegionOutcome`]
//!   so callers get partial results with an explicit marker per failed item
//!   instead of losing the whole textbook to one illegible equation.
//!
//! The separation lets an accessible front-end announce "this part could not
//! be processed" for individual regions while still playing everything else.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2speech library.
///
/// Region-level failures use [`RegionError`] and are stored in
/// [`crate::output::RegionOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2SpeechError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' could not be decoded: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    DecodeFailure { path: PathBuf, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// A detection-model artifact (weights or class-label list) is missing
    /// or malformed. Raised eagerly at pipeline start, before any page is
    /// rasterised, so a run either has a working detector or produces no
    /// partial output at all.
    #[error("Detection model could not be loaded from '{model_dir}': {detail}\nThe model directory must contain model.onnx and classes.names.")]
    ModelLoadFailure { model_dir: PathBuf, detail: String },

    /// A detection emitted a class id with no entry in the label list.
    #[error("Detection class id {class_id} is out of range ({num_labels} labels loaded)")]
    UnknownClassId { class_id: usize, num_labels: usize },

    // ── Service configuration ─────────────────────────────────────────────
    /// A required external-service credential is absent. A partially
    /// configured pipeline cannot produce usable audio, so this aborts
    /// before page one.
    #[error("Pipeline is not fully configured: {0}")]
    ConfigurationError(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single cropped region.
///
/// Stored inside [`crate::output::RegionOutcome`] when one of the three
/// recognition stages fails for that region. The run continues with the
/// remaining regions; the failed item's result fields carry the
/// `"ERROR in Prediction"` sentinel in the aggregated output sequences.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RegionError {
    /// The markup-recognition model produced no usable output for this crop.
    #[error("Region '{source}': markup recognition failed: {detail}")]
    Recognition { r#source: String, detail: String },

    /// The language-model rewording call failed after retries.
    #[error("Region '{source}': rewording call failed after {retries} retries: {detail}")]
    TranscriptionService {
        r#source: String,
        retries: u8,
        detail: String,
    },

    /// Audio synthesis failed for the final text.
    #[error("Region '{source}': speech synthesis failed: {detail}")]
    Synthesis { r#source: String, detail: String },

    /// A service call exceeded the per-item timeout.
    #[error("Region '{source}': {stage} timed out after {secs}s")]
    Timeout {
        r#source: String,
        stage: String,
        secs: u64,
    },
}
