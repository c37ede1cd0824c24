//! HTTP API surface for the practice backend.
//!
//! This module owns routing, request parsing, and response formatting
//! while delegating real work to the vocabulary store, the speech
//! collaborators, and the verification pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::audio::{AudioBlob, AudioNormalizer};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::speech::{Synthesizer, Transcriber, TTS_LANG_HEBREW};
use crate::verify;
use crate::vocab::{DifficultyLevel, SampleFilter, VocabStore, WordCategory};

/// Human-readable service name returned by the health endpoint.
pub const APP_NAME: &str = "vocab-practice-server";
/// Service version string returned by the health endpoint.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state injected into all route handlers.
pub struct AppState {
    pub cfg: AppConfig,
    pub vocab: VocabStore,
    pub normalizer: AudioNormalizer,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl AppState {
    pub fn new(
        cfg: AppConfig,
        vocab: VocabStore,
        normalizer: AudioNormalizer,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            cfg,
            vocab,
            normalizer,
            transcriber,
            synthesizer,
        }
    }
}

/// Builds the Axum router for all public endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.cfg.cors_origins);
    Router::new()
        .route("/health", get(health))
        .route("/api/next_word", get(next_word))
        .route("/api/vocabulary", get(vocabulary))
        .route("/api/vocabulary/categories", get(categories))
        .route("/api/vocabulary/difficulty_levels", get(difficulty_levels))
        .route("/api/vocabulary/stats", get(vocabulary_stats))
        .route("/api/get_pronunciation", get(pronunciation))
        .route("/api/get_audio_settings", get(audio_settings))
        .route("/api/check_answer/:word", post(check_answer))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86_400))
}

/// Status endpoint (`GET /health`).
async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "name": APP_NAME, "version": APP_VERSION}))
}

fn default_tts_lang() -> String {
    TTS_LANG_HEBREW.to_string()
}

#[derive(Debug, Deserialize)]
struct NextWordQuery {
    #[serde(default = "default_tts_lang")]
    lang: String,
    category: Option<String>,
    difficulty: Option<String>,
    exclude: Option<String>,
}

/// Serves a vocabulary prompt with synthesized audio (`GET /api/next_word`).
async fn next_word(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NextWordQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let filter = SampleFilter {
        category: query
            .category
            .as_deref()
            .map(str::parse::<WordCategory>)
            .transpose()?,
        difficulty: query
            .difficulty
            .as_deref()
            .map(str::parse::<DifficultyLevel>)
            .transpose()?,
        exclude: query
            .exclude
            .as_deref()
            .map(|raw| raw.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    };

    let mut sample = state.vocab.random_sample(1, &filter);
    if sample.is_empty() {
        warn!(
            category = query.category.as_deref(),
            difficulty = query.difficulty.as_deref(),
            "no words matched filters; falling back to the full table"
        );
        sample = state.vocab.random_sample(1, &SampleFilter::default());
    }
    let entry = sample
        .first()
        .ok_or_else(|| AppError::internal("no vocabulary words available"))?;

    let prompt_word = if query.lang == "en" {
        &entry.english
    } else {
        &entry.hebrew
    };
    let prompt_audio = state
        .synthesizer
        .synthesize(&format!("{prompt_word}?"), &query.lang)
        .await?;

    Ok(Json(json!({
        "word": prompt_word,
        "audio_base64": BASE64.encode(prompt_audio),
        "audio_settings": state.cfg.audio_settings,
        "metadata": entry,
    })))
}

#[derive(Debug, Deserialize)]
struct VocabularyQuery {
    category: Option<String>,
    difficulty: Option<String>,
    search: Option<String>,
    limit: Option<usize>,
}

/// Lists vocabulary entries with optional filters (`GET /api/vocabulary`).
async fn vocabulary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VocabularyQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let category = query
        .category
        .as_deref()
        .map(str::parse::<WordCategory>)
        .transpose()?;
    let difficulty = query
        .difficulty
        .as_deref()
        .map(str::parse::<DifficultyLevel>)
        .transpose()?;

    let mut words: Vec<_> = match query.search.as_deref() {
        Some(search) => state.vocab.search(search),
        None => state.vocab.all().iter().collect(),
    };
    if let Some(category) = category {
        words.retain(|word| word.category == category);
    }
    if let Some(difficulty) = difficulty {
        words.retain(|word| word.difficulty == difficulty);
    }

    let limit = query.limit.unwrap_or(50);
    let returned: Vec<_> = words.iter().take(limit).collect();

    Ok(Json(json!({
        "total": words.len(),
        "returned": returned.len(),
        "words": returned,
    })))
}

/// Lists word categories (`GET /api/vocabulary/categories`).
async fn categories() -> Json<serde_json::Value> {
    let values: Vec<_> = WordCategory::ALL.iter().map(|c| c.as_str()).collect();
    Json(json!({"categories": values}))
}

/// Lists difficulty levels (`GET /api/vocabulary/difficulty_levels`).
async fn difficulty_levels() -> Json<serde_json::Value> {
    let values: Vec<_> = DifficultyLevel::ALL.iter().map(|d| d.as_str()).collect();
    Json(json!({"difficulty_levels": values}))
}

/// Vocabulary size breakdowns (`GET /api/vocabulary/stats`).
async fn vocabulary_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.vocab.stats()).unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct PronunciationQuery {
    word: String,
    #[serde(default = "default_tts_lang")]
    lang: String,
}

/// Synthesizes pronunciation audio for a word (`GET /api/get_pronunciation`).
///
/// When the word is a known vocabulary term it is first translated through
/// the pair table so the audio is in the requested language; unknown words
/// are synthesized as-is.
async fn pronunciation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PronunciationQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let text = if query.lang == "en" {
        state
            .vocab
            .english_for(&query.word)
            .unwrap_or(&query.word)
            .to_string()
    } else {
        state
            .vocab
            .hebrew_for(&query.word)
            .unwrap_or(&query.word)
            .to_string()
    };

    let audio = state.synthesizer.synthesize(&text, &query.lang).await?;
    Ok(Json(json!({
        "word": query.word,
        "audio_base64": BASE64.encode(audio),
    })))
}

/// Advertised recording parameters (`GET /api/get_audio_settings`).
async fn audio_settings(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.cfg.audio_settings))
}

/// Verifies a spoken answer (`POST /api/check_answer/:word`).
async fn check_answer(
    State(state): State<Arc<AppState>>,
    Path(word): Path<String>,
    multipart: Multipart,
) -> Result<Json<verify::VerificationResult>, AppError> {
    let blob = parse_upload(multipart).await?;
    let result = verify::verify(
        &state.vocab,
        &state.normalizer,
        state.transcriber.as_ref(),
        &word,
        blob,
    )
    .await?;
    Ok(Json(result))
}

/// Extracts the uploaded audio file from the multipart body.
async fn parse_upload(mut multipart: Multipart) -> Result<AudioBlob, AppError> {
    let mut blob: Option<AudioBlob> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_multipart(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(ToOwned::to_owned);
        let content_type = field.content_type().map(ToOwned::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_multipart(format!("failed to read file bytes: {err}")))?;

        blob = Some(AudioBlob {
            bytes: bytes.to_vec(),
            filename,
            content_type,
        });
    }

    let blob = blob.ok_or_else(|| {
        AppError::invalid_request("missing required multipart field: file", Some("file"), None)
    })?;
    if blob.bytes.is_empty() {
        return Err(AppError::invalid_request(
            "uploaded file is empty",
            Some("file"),
            Some("empty_file"),
        ));
    }

    Ok(blob)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::audio::{AudioNormalizer, ConversionStrategy};
    use crate::config::AppConfig;
    use crate::error::AppError;
    use crate::speech::{Synthesizer, Transcriber};
    use crate::vocab::VocabStore;

    use super::{build_router, AppState};

    struct MockTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for MockTranscriber {
        async fn transcribe(&self, _path: &Path, _language: &str) -> Result<String, AppError> {
            Ok(self.0.to_string())
        }
    }

    struct MockSynthesizer;

    #[async_trait]
    impl Synthesizer for MockSynthesizer {
        async fn synthesize(&self, _text: &str, _language: &str) -> Result<Vec<u8>, AppError> {
            Ok(b"fake-mp3-bytes".to_vec())
        }
    }

    struct CopyStrategy;

    #[async_trait]
    impl ConversionStrategy for CopyStrategy {
        fn name(&self) -> &'static str {
            "copy"
        }
        async fn convert(&self, input: &Path, output: &Path) -> Result<(), String> {
            std::fs::copy(input, output).map_err(|err| err.to_string())?;
            Ok(())
        }
    }

    fn app(transcription: &'static str) -> axum::Router {
        let state = Arc::new(AppState::new(
            AppConfig::for_tests(),
            VocabStore::load(None).expect("embedded vocabulary"),
            AudioNormalizer::with_strategies(vec![Box::new(CopyStrategy)]),
            Arc::new(MockTranscriber(transcription)),
            Arc::new(MockSynthesizer),
        ));
        build_router(state)
    }

    async fn parse_json_response(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), 1024 * 1024)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn multipart_body(boundary: &str, filename: Option<&str>, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: audio/webm\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\n")
                    .as_bytes(),
            ),
        }
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    fn check_answer_request(word: &str, filename: Option<&str>, payload: &[u8]) -> Request<Body> {
        let boundary = "X-BOUNDARY";
        Request::builder()
            .uri(format!("/api/check_answer/{word}"))
            .method("POST")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(multipart_body(boundary, filename, payload)))
            .expect("request")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let res = app("man")
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["status"], "ok");
    }

    #[tokio::test]
    async fn vocabulary_lists_entries() {
        let res = app("man")
            .oneshot(
                Request::builder()
                    .uri("/api/vocabulary?limit=5")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["returned"], 5);
        assert!(payload["total"].as_u64().expect("total") >= 5);
    }

    #[tokio::test]
    async fn vocabulary_rejects_invalid_category() {
        let res = app("man")
            .oneshot(
                Request::builder()
                    .uri("/api/vocabulary?category=nonsense")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"]["code"], "invalid_category");
    }

    #[tokio::test]
    async fn categories_endpoint_lists_all_variants() {
        let res = app("man")
            .oneshot(
                Request::builder()
                    .uri("/api/vocabulary/categories")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let payload = parse_json_response(res).await;
        assert_eq!(
            payload["categories"].as_array().expect("array").len(),
            11
        );
    }

    #[tokio::test]
    async fn next_word_returns_prompt_audio_and_metadata() {
        let res = app("man")
            .oneshot(
                Request::builder()
                    .uri("/api/next_word?difficulty=beginner")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert!(payload["word"].as_str().is_some());
        assert!(!payload["audio_base64"].as_str().expect("audio").is_empty());
        assert_eq!(payload["metadata"]["difficulty"], "beginner");
        assert_eq!(payload["audio_settings"]["format"], "mp3");
    }

    #[tokio::test]
    async fn pronunciation_translates_known_words() {
        let res = app("man")
            .oneshot(
                Request::builder()
                    .uri("/api/get_pronunciation?word=water&lang=iw")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["word"], "water");
        assert!(!payload["audio_base64"].as_str().expect("audio").is_empty());
    }

    #[tokio::test]
    async fn check_answer_reports_incorrect_answer() {
        // Prompted with the English side, so the expected answer is Hebrew;
        // the mock transcriber says "man" which cannot match.
        let res = app("man")
            .oneshot(check_answer_request("man", Some("clip.webm"), b"fake-audio"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["is_correct"], false);
        assert_eq!(payload["correct_answer"], "אִישׁ");
    }

    #[tokio::test]
    async fn check_answer_scores_exact_match() {
        // Prompted with "water", the learner answers with the Hebrew side.
        let res = app("מַיִם")
            .oneshot(check_answer_request("water", Some("clip.webm"), b"fake-audio"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["correct_answer"], "מַיִם");
        assert_eq!(payload["is_correct"], true);
        assert_eq!(payload["pronunciation_score"], 100);
    }

    #[tokio::test]
    async fn check_answer_rejects_unknown_word() {
        let res = app("man")
            .oneshot(check_answer_request(
                "zzznotaword",
                Some("clip.webm"),
                b"fake-audio",
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"]["code"], "unknown_term");
    }

    #[tokio::test]
    async fn check_answer_rejects_missing_file_field() {
        let res = app("man")
            .oneshot(check_answer_request("man", None, b"ignored"))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn check_answer_rejects_empty_file() {
        let res = app("man")
            .oneshot(check_answer_request("man", Some("clip.webm"), b""))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let payload = parse_json_response(res).await;
        assert_eq!(payload["error"]["code"], "empty_file");
    }
}
