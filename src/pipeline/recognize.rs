//! Per-region recognition: crop image → markup → English text → audio.
//!
//! Regions are routed by their in-memory class label; the `"Equation"`
//! group is processed first, then `"Text"` — a concatenation-order
//! convention of the output sequences, nothing more. Other classes
//! (figures, tables) are cropped for display but not spoken.
//!
//! Every failure in here is item-local. A region whose crop is unreadable,
//! whose markup call errors, whose rewording times out, or whose audio
//! write fails gets sentinel fields in its [`RegionOutcome`] and the
//! pipeline moves on — one illegible equation must never silence the rest
//! of the textbook.
//!
//! ## Retry strategy
//!
//! The rewording endpoint is the only call that is both transient-failure
//! prone (429/503 under load) and cheap to retry. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) keeps the total back-off under a few
//! seconds per region. Markup recognition and synthesis get one attempt
//! each within the per-item timeout.

use crate::config::PipelineConfig;
use crate::error::RegionError;
use crate::output::{RegionOutcome, RegionText};
use crate::pipeline::extract::RegionArtifact;
use crate::pipeline::latex::latex_to_text;
use crate::prompts::reword_prompt;
use crate::services::{MarkupRecognizer, Reworder, ServiceError, SpeechSynthesizer};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

/// Class labels whose regions are fed through recognition, in processing
/// (and therefore output concatenation) order.
pub const RECOGNIZED_CLASSES: [&str; 2] = ["Equation", "Text"];

/// The three resolved service objects, shared read-only across regions.
pub struct RecognitionServices {
    pub recognizer: Arc<dyn MarkupRecognizer>,
    pub reworder: Arc<dyn Reworder>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Run the recognition pipeline over all artifacts, grouped by class.
///
/// Within a group, regions run concurrently (`config.concurrency`) but
/// results are reassembled in input order — for N inputs the outcome list
/// has exactly N entries, index-aligned with the group's enumeration.
pub async fn recognize_regions(
    artifacts: &[RegionArtifact],
    services: &RecognitionServices,
    config: &PipelineConfig,
) -> Vec<RegionOutcome> {
    let total_regions = artifacts
        .iter()
        .filter(|a| RECOGNIZED_CLASSES.contains(&a.class_label.as_str()))
        .count();
    let completed = Arc::new(AtomicUsize::new(0));
    let mut outcomes = Vec::new();

    for class in RECOGNIZED_CLASSES {
        let group: Vec<&RegionArtifact> = artifacts
            .iter()
            .filter(|a| a.class_label == class)
            .collect();
        if group.is_empty() {
            continue;
        }
        debug!("Recognizing {} {} regions", group.len(), class);

        let group_outcomes: Vec<RegionOutcome> = stream::iter(group.into_iter().map(|artifact| {
            let services = RecognitionServices {
                recognizer: Arc::clone(&services.recognizer),
                reworder: Arc::clone(&services.reworder),
                synthesizer: Arc::clone(&services.synthesizer),
            };
            let config = config.clone();
            let artifact = artifact.clone();
            let completed = Arc::clone(&completed);
            async move {
                let outcome = process_region(&artifact, &services, &config).await;
                if let Some(ref cb) = config.progress_callback {
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    let ok = outcome.markup.is_recognized()
                        && outcome.text.is_recognized()
                        && outcome.audio.is_recognized();
                    cb.on_region_done(done, total_regions, ok);
                }
                outcome
            }
        }))
        .buffered(config.concurrency)
        .collect()
        .await;

        outcomes.extend(group_outcomes);
    }

    outcomes
}

/// Run one region through markup recognition, rewording, and synthesis.
///
/// Always returns an outcome — never propagates an error upward. A failure
/// at any stage marks all three result fields with the sentinel for this
/// item (the stored error still says which stage broke); the remaining
/// regions are unaffected.
pub async fn process_region(
    artifact: &RegionArtifact,
    services: &RecognitionServices,
    config: &PipelineConfig,
) -> RegionOutcome {
    let source_name = artifact
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.path.display().to_string());
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    // ── Stage 1: markup recognition ──────────────────────────────────────
    let png = match tokio::fs::read(&artifact.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Region {}: unreadable crop: {}", source_name, e);
            return RegionOutcome::failed(
                artifact.path.clone(),
                artifact.class_label.clone(),
                RegionError::Recognition {
                    source: source_name,
                    detail: format!("unreadable crop: {e}"),
                },
            );
        }
    };

    let markup = match timeout(call_timeout, services.recognizer.recognize(&png)).await {
        Ok(Ok(markup)) => markup,
        Ok(Err(e)) => {
            warn!("Region {}: markup recognition failed: {}", source_name, e);
            return RegionOutcome::failed(
                artifact.path.clone(),
                artifact.class_label.clone(),
                RegionError::Recognition {
                    source: source_name,
                    detail: e.to_string(),
                },
            );
        }
        Err(_) => {
            return RegionOutcome::failed(
                artifact.path.clone(),
                artifact.class_label.clone(),
                RegionError::Timeout {
                    source: source_name,
                    stage: "markup recognition".into(),
                    secs: config.api_timeout_secs,
                },
            );
        }
    };
    debug!("Region {}: markup: {}", source_name, markup);

    // ── Stage 2: deterministic markup → plain text ───────────────────────
    let plain_text = latex_to_text(&markup);

    // ── Stage 3: rewording with retry ────────────────────────────────────
    let response = match reword_with_retry(&services.reworder, &plain_text, config).await {
        Ok(r) => r,
        Err(err) => {
            let region_err = match err {
                RewordFailure::Timeout => RegionError::Timeout {
                    source: source_name,
                    stage: "rewording".into(),
                    secs: config.api_timeout_secs,
                },
                RewordFailure::Service(detail) => RegionError::TranscriptionService {
                    source: source_name,
                    retries: config.max_retries as u8,
                    detail,
                },
            };
            return RegionOutcome::failed(
                artifact.path.clone(),
                artifact.class_label.clone(),
                region_err,
            );
        }
    };
    let english = extract_answer(&response);
    debug!("Region {}: english: {}", source_name, english);

    // ── Stage 4: speech synthesis ────────────────────────────────────────
    let audio_path = match timeout(call_timeout, services.synthesizer.synthesize(&english)).await {
        Ok(Ok(bytes)) => match write_audio(&bytes, config).await {
            Ok(path) => path,
            Err(detail) => {
                warn!("Region {}: audio write failed: {}", source_name, detail);
                return RegionOutcome::failed(
                    artifact.path.clone(),
                    artifact.class_label.clone(),
                    RegionError::Synthesis {
                        source: source_name,
                        detail,
                    },
                );
            }
        },
        Ok(Err(e)) => {
            warn!("Region {}: synthesis failed: {}", source_name, e);
            return RegionOutcome::failed(
                artifact.path.clone(),
                artifact.class_label.clone(),
                RegionError::Synthesis {
                    source: source_name,
                    detail: e.to_string(),
                },
            );
        }
        Err(_) => {
            return RegionOutcome::failed(
                artifact.path.clone(),
                artifact.class_label.clone(),
                RegionError::Timeout {
                    source: source_name,
                    stage: "speech synthesis".into(),
                    secs: config.api_timeout_secs,
                },
            );
        }
    };

    RegionOutcome {
        source: artifact.path.clone(),
        class_label: artifact.class_label.clone(),
        markup: RegionText::Recognized(markup),
        text: RegionText::Recognized(english),
        audio: RegionText::Recognized(audio_path.to_string_lossy().into_owned()),
    }
}

enum RewordFailure {
    Service(String),
    Timeout,
}

/// Call the reworder with exponential backoff on transient failures.
async fn reword_with_retry(
    reworder: &Arc<dyn Reworder>,
    plain_text: &str,
    config: &PipelineConfig,
) -> Result<String, RewordFailure> {
    let prompt = reword_prompt(plain_text);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<RewordFailure> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Rewording retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, reworder.reword(&prompt)).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(ServiceError(detail))) => last_err = Some(RewordFailure::Service(detail)),
            Err(_) => last_err = Some(RewordFailure::Timeout),
        }
    }

    Err(last_err.unwrap_or(RewordFailure::Service("unknown error".into())))
}

static RE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(.*?)""#).unwrap());

/// Extract the model's answer from its completion response.
///
/// Models often wrap the rewording in quotes and pad it with commentary;
/// the first quoted substring is the answer when present, otherwise the
/// whole trimmed response is used.
pub fn extract_answer(response: &str) -> String {
    RE_QUOTED
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| response.trim().to_string())
}

/// Write MP3 bytes under the audio directory with a unique name.
async fn write_audio(bytes: &[u8], config: &PipelineConfig) -> Result<PathBuf, String> {
    tokio::fs::create_dir_all(&config.audio_dir)
        .await
        .map_err(|e| format!("cannot create audio dir: {e}"))?;

    let name = format!("audio_{}.mp3", &Uuid::new_v4().simple().to_string()[..6]);
    let path = config.audio_dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| format!("cannot write audio file: {e}"))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_answer_is_preferred() {
        let response = r#"Sure! Here is the text: "x equals two" — hope that helps."#;
        assert_eq!(extract_answer(response), "x equals two");
    }

    #[test]
    fn first_of_several_quotes_wins() {
        let response = r#""first" and then "second""#;
        assert_eq!(extract_answer(response), "first");
    }

    #[test]
    fn unquoted_response_is_trimmed() {
        assert_eq!(extract_answer("  x equals two  \n"), "x equals two");
    }

    #[test]
    fn empty_quotes_yield_empty_answer() {
        assert_eq!(extract_answer(r#""""#), "");
    }
}
