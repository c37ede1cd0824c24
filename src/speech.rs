//! Speech collaborator adapters.
//!
//! The pipeline depends on the [`Transcriber`] and [`Synthesizer`] traits
//! instead of concrete services, which keeps request handling decoupled
//! from the external HTTP calls and lets tests inject mocks.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::config::AppConfig;
use crate::error::AppError;

/// ISO code for Hebrew transcription.
pub const LANG_HEBREW: &str = "he";
/// ISO code for English transcription.
pub const LANG_ENGLISH: &str = "en";
/// Google's legacy Hebrew code, still required by the TTS endpoint.
/// Distinct from [`LANG_HEBREW`]: transcription uses the ISO code.
pub const TTS_LANG_HEBREW: &str = "iw";

/// Speech-to-text collaborator contract.
///
/// The target language is always passed explicitly; relying on the
/// service's auto-detection measurably degrades accuracy for short
/// Hebrew/English answers. One attempt, no retry.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path, language: &str) -> Result<String, AppError>;
}

/// Text-to-speech collaborator contract; returns encoded audio bytes.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, AppError>;
}

/// OpenAI-compatible Whisper transcription over HTTP multipart.
pub struct WhisperApiTranscriber {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl WhisperApiTranscriber {
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| AppError::internal(format!("failed to create HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_base: cfg.openai_api_base.trim_end_matches('/').to_string(),
            api_key: cfg.openai_api_key.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn transcribe(&self, audio_path: &Path, language: &str) -> Result<String, AppError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|err| AppError::Transcription(format!("failed to read audio: {err}")))?;

        let file = Part::bytes(bytes)
            .file_name("answer.mp3")
            .mime_str("audio/mpeg")
            .map_err(|err| AppError::Transcription(format!("invalid part: {err}")))?;
        let form = Form::new()
            .part("file", file)
            .text("model", "whisper-1")
            .text("language", language.to_string());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::Transcription(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transcription(format!(
                "service returned {status}: {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|err| AppError::Transcription(format!("invalid response body: {err}")))?;
        let text = payload["text"].as_str().ok_or_else(|| {
            AppError::Transcription("response body missing text field".to_string())
        })?;

        Ok(text.trim().to_string())
    }
}

/// Google Translate TTS, the same endpoint gTTS wraps.
pub struct GoogleTranslateTts {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslateTts {
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AppError::internal(format!("failed to create HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: cfg.tts_endpoint.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, AppError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", language),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|err| AppError::Synthesis(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Synthesis(format!("service returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| AppError::Synthesis(format!("failed to read body: {err}")))?;
        if bytes.is_empty() {
            return Err(AppError::Synthesis("service returned empty audio".to_string()));
        }

        Ok(bytes.to_vec())
    }
}
