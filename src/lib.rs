//! # pdf2speech
//!
//! Turn scanned textbook PDFs into accessible output for blind students:
//! cropped region images, extracted text, LaTeX for equations, and
//! synthesized audio.
//!
//! ## Why this crate?
//!
//! Whole-page OCR collapses on textbook layouts — equations, figures, and
//! tables interleave with prose and come out garbled or out of reading
//! order. Instead this crate rasterises each page, localizes semantic
//! regions with an object detector, and feeds each region through a
//! class-appropriate recognition path, so an equation is read out as an
//! equation rather than as symbol soup.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Detect    ONNX forward pass; decode candidate boxes per page
//!  ├─ 4. Suppress  confidence filter + class-agnostic NMS + clamping
//!  ├─ 5. Extract   crops by class + annotated page overview
//!  ├─ 6. Recognize LaTeX → plain text → English rewording → MP3 audio
//!  └─ 7. Output    five aligned artifact sequences + per-run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2speech::{process, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Rewording key auto-detected from GROQ_API_KEY
//!     let config = PipelineConfig::default();
//!     let output = process("textbook.pdf", &config).await?;
//!     for (text, audio) in output.texts().iter().zip(output.audio_paths()) {
//!         println!("{text} → {audio}");
//!     }
//!     eprintln!("{} regions, {} failed",
//!         output.stats.total_regions,
//!         output.stats.failed_regions);
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! Fatal problems (missing PDF, corrupt model, absent credentials) abort a
//! run before any page is processed. Everything after that boundary is
//! item-local: a bad page is skipped and a failed region carries the
//! literal `"ERROR in Prediction"` marker in the output sequences, so one
//! illegible equation never silences the rest of the book.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2speech` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2speech = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod services;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{Pdf2SpeechError, RegionError};
pub use output::{RegionOutcome, RegionText, RunOutput, RunStats, ERROR_SENTINEL};
pub use pipeline::render::PdfInfo;
pub use process::{inspect, process, process_sync};
pub use progress::RunProgressCallback;
pub use services::{MarkupRecognizer, Reworder, ServiceError, SpeechSynthesizer};
