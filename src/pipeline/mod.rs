//! Pipeline stages for PDF-to-speech extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations (e.g. a different detection backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ detect ──▶ suppress ──▶ extract ──▶ recognize
//! (URL/path) (pdfium)  (onnx)     (NMS+clamp)  (crops)     (LaTeX→text→audio)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]   — rasterise pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`detect`]   — one forward pass per page; decode raw cells into
//!    candidate boxes at the loose emission threshold
//! 4. [`suppress`] — display-threshold filter, class-agnostic NMS, clamping
//! 5. [`extract`]  — crop survivors into the class-partitioned artifact
//!    store and draw the annotated page overview
//! 6. [`latex`]    — deterministic markup-to-text rules
//! 7. [`recognize`] — per-region markup → English → audio; the only stages
//!    with network I/O

pub mod detect;
pub mod extract;
pub mod input;
pub mod latex;
pub mod recognize;
pub mod render;
pub mod suppress;
