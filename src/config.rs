//! Configuration loading from environment variables.
//!
//! Values are validated early so startup fails fast with actionable
//! errors, and the resulting struct is passed by reference into every
//! component that needs it; pipeline code never reads the environment.

use crate::error::AppError;
use serde::Serialize;
use std::env;

/// Default transcription API base (OpenAI-compatible).
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// Default speech synthesis endpoint (Google Translate TTS).
pub const DEFAULT_TTS_ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Recording parameters advertised to clients; they match the canonical
/// encoding every upload is converted to before transcription.
#[derive(Debug, Clone, Serialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: &'static str,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: crate::audio::TARGET_SAMPLE_RATE,
            channels: crate::audio::TARGET_CHANNELS,
            format: crate::audio::TARGET_FORMAT,
        }
    }
}

/// Runtime configuration for the HTTP server and collaborator adapters.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host interface to bind, for example `127.0.0.1`.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// API key for the transcription collaborator.
    pub openai_api_key: String,
    /// Base URL of the transcription collaborator.
    pub openai_api_base: String,
    /// Speech synthesis endpoint URL.
    pub tts_endpoint: String,
    /// Path to the ffmpeg binary used by the primary conversion strategy.
    pub ffmpeg_path: String,
    /// Optional vocabulary file overriding the embedded table.
    pub vocabulary_path: Option<String>,
    /// Origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
    /// Recording parameters advertised to clients.
    pub audio_settings: AudioSettings,
}

impl AppConfig {
    /// Builds configuration from environment variables.
    ///
    /// Variables:
    /// - `HOST` (default `127.0.0.1`)
    /// - `PORT` (default `8000`)
    /// - `OPENAI_API_KEY` (required)
    /// - `OPENAI_API_BASE` (default `https://api.openai.com/v1`)
    /// - `TTS_ENDPOINT` (default Google Translate TTS)
    /// - `FFMPEG_PATH` (default `ffmpeg`)
    /// - `VOCABULARY_PATH` (optional, defaults to the embedded table)
    /// - `CORS_ORIGINS` (comma-separated, default `http://localhost:3000`)
    pub fn from_env() -> Result<Self, AppError> {
        let host = env_str("HOST", "127.0.0.1");
        let port = env_u16("PORT", 8000)?;
        let openai_api_key = env_opt("OPENAI_API_KEY").ok_or_else(|| {
            AppError::internal("OPENAI_API_KEY is not set; transcription requires it")
        })?;

        Ok(Self {
            host,
            port,
            openai_api_key,
            openai_api_base: env_str("OPENAI_API_BASE", DEFAULT_API_BASE),
            tts_endpoint: env_str("TTS_ENDPOINT", DEFAULT_TTS_ENDPOINT),
            ffmpeg_path: env_str("FFMPEG_PATH", "ffmpeg"),
            vocabulary_path: env_opt("VOCABULARY_PATH"),
            cors_origins: parse_origins(&env_str("CORS_ORIGINS", "http://localhost:3000")),
            audio_settings: AudioSettings::default(),
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn env_str(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<u16>().map_err(|_| {
        AppError::internal(format!("invalid {name}={raw:?}; expected integer 1-65535"))
    })?;
    if parsed == 0 {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}


#[cfg(test)]
impl AppConfig {
    /// Configuration for tests; never reads the environment.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            openai_api_key: "test-key".to_string(),
            openai_api_base: DEFAULT_API_BASE.to_string(),
            tts_endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            vocabulary_path: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
            audio_settings: AudioSettings::default(),
        }
    }
}
