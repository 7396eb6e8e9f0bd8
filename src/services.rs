//! External capability providers: markup recognition, rewording, speech.
//!
//! Each service is a trait so the pipeline never knows whether it is talking
//! to a real endpoint or a test double. The three seams mirror the three
//! network calls of the recognition pipeline:
//!
//! * [`MarkupRecognizer`] — crop image → textual markup (LaTeX)
//! * [`Reworder`] — plain text → natural-English rewording
//! * [`SpeechSynthesizer`] — text → MP3 bytes
//!
//! The HTTP implementations live here too. They are intentionally thin:
//! retry, timeout, and sentinel handling belong to the recognition pipeline,
//! which treats every trait method as a single fallible attempt.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Error from a single service attempt.
///
/// Deliberately a plain message: the recognition pipeline maps it into the
/// per-region [`crate::error::RegionError`] taxonomy together with the
/// source filename and stage, which the service itself does not know.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        ServiceError(e.to_string())
    }
}

/// Image → textual markup (e.g. LaTeX for an equation crop).
#[async_trait]
pub trait MarkupRecognizer: Send + Sync {
    /// Recognize the markup in a PNG-encoded crop.
    async fn recognize(&self, png: &[u8]) -> Result<String, ServiceError>;
}

/// Plain text → natural English via a language-model completion.
#[async_trait]
pub trait Reworder: Send + Sync {
    /// Return the raw completion content for the given prompt.
    async fn reword(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Text → synthesized speech audio (MP3 bytes).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into MP3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError>;
}

// ── Markup recognition over HTTP ─────────────────────────────────────────

/// HTTP client for a pix2tex-style prediction endpoint.
///
/// The request body is JSON with the crop as a base64 PNG; the response is
/// either a bare JSON string or `{"prediction": "..."}` depending on server
/// version, so both shapes are accepted.
pub struct HttpMarkupRecognizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMarkupRecognizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Deserialize)]
struct PredictionBody {
    prediction: String,
}

#[async_trait]
impl MarkupRecognizer for HttpMarkupRecognizer {
    async fn recognize(&self, png: &[u8]) -> Result<String, ServiceError> {
        let body = json!({ "image": STANDARD.encode(png) });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError(format!(
                "markup endpoint returned HTTP {}",
                response.status()
            )));
        }

        let text = response.text().await?;
        let markup = match serde_json::from_str::<PredictionBody>(&text) {
            Ok(b) => b.prediction,
            Err(_) => serde_json::from_str::<String>(&text).unwrap_or(text),
        };

        let markup = markup.trim().to_string();
        if markup.is_empty() {
            return Err(ServiceError("markup endpoint returned empty output".into()));
        }
        debug!("Recognized markup ({} chars)", markup.len());
        Ok(markup)
    }
}

// ── Rewording over an OpenAI-compatible completion API ───────────────────

/// Chat-completion client for an OpenAI-compatible endpoint (Groq).
///
/// One user message, `stop: ["```"]` so the model cannot drift into fenced
/// code, content of the first choice returned verbatim. Quoted-answer
/// extraction is the caller's concern.
pub struct OpenAiCompatReworder {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatReworder {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[async_trait]
impl Reworder for OpenAiCompatReworder {
    async fn reword(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stop": "```",
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError(format!(
                "completion endpoint returned HTTP {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError(format!("malformed completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError("completion response had no choices".into()))
    }
}

// ── Speech synthesis via the Google Translate TTS endpoint ───────────────

/// Maximum characters per TTS request; the endpoint rejects longer inputs.
const TTS_CHUNK_CHARS: usize = 200;

/// Unauthenticated Google Translate text-to-speech client.
///
/// The endpoint caps input length, so longer texts are split at whitespace
/// into ≤200-character chunks and the returned MP3 payloads concatenated —
/// MP3 frames are self-delimiting, so simple concatenation plays correctly.
pub struct GoogleTranslateTts {
    client: reqwest::Client,
    lang: String,
}

impl GoogleTranslateTts {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            lang: lang.into(),
        }
    }
}

impl Default for GoogleTranslateTts {
    fn default() -> Self {
        Self::new("en")
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError("nothing to synthesize: empty text".into()));
        }

        let mut audio = Vec::new();
        for chunk in split_for_tts(text, TTS_CHUNK_CHARS) {
            let response = self
                .client
                .get("https://translate.google.com/translate_tts")
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.lang.as_str()),
                    ("q", chunk),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(ServiceError(format!(
                    "TTS endpoint returned HTTP {}",
                    response.status()
                )));
            }
            audio.extend_from_slice(&response.bytes().await?);
        }
        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }
}

/// Split `text` into chunks of at most `max_chars`, preferring whitespace
/// boundaries. A single overlong word is hard-split rather than dropped.
fn split_for_tts(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_chars {
        let window = &rest[..max_chars];
        let cut = window
            .rfind(char::is_whitespace)
            .filter(|&i| i > 0)
            .unwrap_or(max_chars);
        let boundary = floor_char_boundary(rest, cut);
        chunks.push(rest[..boundary].trim_end());
        rest = rest[boundary..].trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Largest char boundary ≤ `index` (stable stand-in for `str::floor_char_boundary`).
fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_for_tts("hello world", 200), vec!["hello world"]);
    }

    #[test]
    fn long_text_splits_at_whitespace() {
        let text = "alpha beta gamma delta epsilon";
        let chunks = split_for_tts(text, 12);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 12, "chunk too long: {c:?}");
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn overlong_word_is_hard_split() {
        let text = "a".repeat(50);
        let chunks = split_for_tts(&text, 20);
        assert!(chunks.iter().all(|c| c.len() <= 20));
        assert_eq!(chunks.concat(), text);
    }
}
