//! Output types returned by [`crate::process::process`].
//!
//! The caller-visible result of a run is five parallel sequences: annotated
//! page images (page-aligned) plus markup / plain text / audio path / source
//! crop path (region-aligned, equations first then text). Internally each
//! region is a [`RegionOutcome`] holding tagged [`RegionText`] values; the
//! flat sequence accessors substitute the [`ERROR_SENTINEL`] string for
//! failed fields so an accessible front-end can announce "this part could
//! not be processed" at the right position instead of halting.

use crate::error::RegionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Placeholder substituted for any result field of a region whose
/// recognition, rewording, or synthesis failed.
pub const ERROR_SENTINEL: &str = "ERROR in Prediction";

/// One result field of a region: either the recognized value or the error
/// that replaced it.
///
/// This is deliberately a tagged type rather than a string inspected for
/// error-ness: callers branch on the variant, and only the flat sequence
/// accessors flatten `Failed` into [`ERROR_SENTINEL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegionText {
    /// The stage produced a value (markup, text, or a written file path).
    Recognized(String),
    /// The stage failed; the error says which one and why.
    Failed(RegionError),
}

impl RegionText {
    /// True if this field carries a real value.
    pub fn is_recognized(&self) -> bool {
        matches!(self, RegionText::Recognized(_))
    }

    /// The recognized value, or the sentinel marker for failed fields.
    pub fn as_sentinel(&self) -> &str {
        match self {
            RegionText::Recognized(s) => s,
            RegionText::Failed(_) => ERROR_SENTINEL,
        }
    }

    /// The recognized value, if any.
    pub fn recognized(&self) -> Option<&str> {
        match self {
            RegionText::Recognized(s) => Some(s),
            RegionText::Failed(_) => None,
        }
    }
}

impl fmt::Display for RegionText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sentinel())
    }
}

/// The full recognition result for one cropped region.
///
/// The three result fields fail together: a recognition failure poisons
/// text and audio as well, since there is nothing to reword or speak.
/// Later-stage failures leave the earlier fields recognized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionOutcome {
    /// Path of the source crop under the class-partitioned artifact store.
    pub source: PathBuf,
    /// Class label the region was filed under (e.g. "Equation", "Text").
    pub class_label: String,
    /// Raw recognized markup (LaTeX for equations).
    pub markup: RegionText,
    /// Natural-English rewording of the markup.
    pub text: RegionText,
    /// Path of the synthesized audio file.
    pub audio: RegionText,
}

impl RegionOutcome {
    /// Build an outcome whose three result fields all failed with `err`.
    pub(crate) fn failed(source: PathBuf, class_label: String, err: RegionError) -> Self {
        Self {
            source,
            class_label,
            markup: RegionText::Failed(err.clone()),
            text: RegionText::Failed(err.clone()),
            audio: RegionText::Failed(err),
        }
    }
}

/// Timing and count statistics for a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages that rasterised and were segmented successfully.
    pub processed_pages: usize,
    /// Pages skipped due to a per-page failure.
    pub skipped_pages: usize,
    /// Region crops fed into the recognition pipeline.
    pub total_regions: usize,
    /// Regions whose outcome carries at least one failed field.
    pub failed_regions: usize,
    /// Wall-clock milliseconds spent rasterising.
    pub render_duration_ms: u64,
    /// Wall-clock milliseconds spent on detection + suppression + extraction.
    pub segment_duration_ms: u64,
    /// Wall-clock milliseconds spent in the recognition pipeline.
    pub recognize_duration_ms: u64,
    /// Total wall-clock milliseconds for the run.
    pub total_duration_ms: u64,
}

/// Everything produced by one run over one PDF.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Annotated overview image per processed page, in page order.
    pub annotated_pages: Vec<PathBuf>,
    /// Per-region outcomes: equation regions first, then text regions,
    /// preserving enumeration order within each class.
    pub regions: Vec<RegionOutcome>,
    /// Run statistics.
    pub stats: RunStats,
}

impl RunOutput {
    /// Raw recognized markup per region, sentinel-flattened.
    pub fn markups(&self) -> Vec<String> {
        self.regions
            .iter()
            .map(|r| r.markup.as_sentinel().to_string())
            .collect()
    }

    /// Natural-English text per region, sentinel-flattened.
    pub fn texts(&self) -> Vec<String> {
        self.regions
            .iter()
            .map(|r| r.text.as_sentinel().to_string())
            .collect()
    }

    /// Audio file path per region, sentinel-flattened.
    pub fn audio_paths(&self) -> Vec<String> {
        self.regions
            .iter()
            .map(|r| r.audio.as_sentinel().to_string())
            .collect()
    }

    /// Source crop path per region.
    pub fn region_paths(&self) -> Vec<PathBuf> {
        self.regions.iter().map(|r| r.source.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_fields_render_as_sentinel() {
        let err = RegionError::Recognition {
            source: "x.png".into(),
            detail: "unreadable".into(),
        };
        let outcome = RegionOutcome::failed(PathBuf::from("x.png"), "Equation".into(), err);
        assert_eq!(outcome.markup.as_sentinel(), ERROR_SENTINEL);
        assert_eq!(outcome.text.to_string(), ERROR_SENTINEL);
        assert!(!outcome.audio.is_recognized());
    }

    #[test]
    fn sequences_are_region_aligned() {
        let ok = RegionOutcome {
            source: PathBuf::from("a.png"),
            class_label: "Text".into(),
            markup: RegionText::Recognized("x+y".into()),
            text: RegionText::Recognized("x plus y".into()),
            audio: RegionText::Recognized("audio_ab12cd.mp3".into()),
        };
        let bad = RegionOutcome::failed(
            PathBuf::from("b.png"),
            "Text".into(),
            RegionError::Synthesis {
                source: "b.png".into(),
                detail: "tts 500".into(),
            },
        );
        let out = RunOutput {
            annotated_pages: vec![],
            regions: vec![ok, bad],
            stats: RunStats::default(),
        };
        assert_eq!(out.markups().len(), 2);
        assert_eq!(out.texts().len(), 2);
        assert_eq!(out.audio_paths().len(), 2);
        assert_eq!(out.region_paths().len(), 2);
        assert_eq!(out.markups()[0], "x+y");
        assert_eq!(out.audio_paths()[1], ERROR_SENTINEL);
    }
}
