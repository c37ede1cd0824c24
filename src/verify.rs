//! Answer-verification pipeline.
//!
//! One invocation per request: resolve the expected answer, normalize the
//! upload, transcribe it in the answer's language, then score the
//! transcription against the expectation. Temporary files created along
//! the way are reclaimed before the invocation returns, on success and on
//! every failure path alike.

use serde::Serialize;
use tracing::debug;

use crate::audio::{AudioBlob, AudioNormalizer, TempTracker};
use crate::error::AppError;
use crate::scoring::{is_correct, normalize_text, pronunciation_score, similarity};
use crate::sniff::sniff_format;
use crate::speech::{Transcriber, LANG_ENGLISH, LANG_HEBREW};
use crate::vocab::{VocabEntry, VocabStore};

/// What a spoken answer is checked against: the expected text and the
/// language it should be transcribed in. The language is the language of
/// the answer, which is the opposite side of the prompted pair.
#[derive(Debug, Clone)]
pub struct AnswerExpectation {
    pub expected_answer: String,
    pub language: &'static str,
    pub entry: Option<VocabEntry>,
}

/// Verdict returned to the client; immutable once assembled.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub user_response: String,
    pub is_correct: bool,
    pub correct_answer: String,
    pub pronunciation_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VocabEntry>,
}

/// Maps a requested term to its expected answer and transcription language.
///
/// Structured entries are matched exactly (case-sensitive) against both
/// sides of each pair; the flat bidirectional maps are the legacy fallback.
pub fn resolve(vocab: &VocabStore, term: &str) -> Result<AnswerExpectation, AppError> {
    if let Some(entry) = vocab
        .all()
        .iter()
        .find(|entry| entry.hebrew == term || entry.english == term)
    {
        let (expected_answer, language) = if entry.hebrew == term {
            (entry.english.clone(), LANG_ENGLISH)
        } else {
            (entry.hebrew.clone(), LANG_HEBREW)
        };
        return Ok(AnswerExpectation {
            expected_answer,
            language,
            entry: Some(entry.clone()),
        });
    }

    if let Some(english) = vocab.english_for(term) {
        return Ok(AnswerExpectation {
            expected_answer: english.to_string(),
            language: LANG_ENGLISH,
            entry: None,
        });
    }
    if let Some(hebrew) = vocab.hebrew_for(term) {
        return Ok(AnswerExpectation {
            expected_answer: hebrew.to_string(),
            language: LANG_HEBREW,
            entry: None,
        });
    }

    Err(AppError::UnknownTerm(term.to_string()))
}

/// Runs the full pipeline for one uploaded answer.
pub async fn verify(
    vocab: &VocabStore,
    normalizer: &AudioNormalizer,
    transcriber: &dyn Transcriber,
    term: &str,
    blob: AudioBlob,
) -> Result<VerificationResult, AppError> {
    let mut tracker = TempTracker::new();
    let outcome = run_pipeline(vocab, normalizer, transcriber, term, blob, &mut tracker).await;
    tracker.cleanup();
    outcome
}

async fn run_pipeline(
    vocab: &VocabStore,
    normalizer: &AudioNormalizer,
    transcriber: &dyn Transcriber,
    term: &str,
    blob: AudioBlob,
    tracker: &mut TempTracker,
) -> Result<VerificationResult, AppError> {
    // The resolver is pure and cheap, so an unknown term fails the request
    // before any transcoding work starts.
    let expectation = resolve(vocab, term)?;

    let detected = sniff_format(
        &blob.bytes,
        blob.filename.as_deref(),
        blob.content_type.as_deref(),
    );
    debug!(
        term,
        filename = blob.filename.as_deref(),
        content_type = blob.content_type.as_deref(),
        detected_format = detected.as_deref(),
        size = blob.bytes.len(),
        "verifying spoken answer"
    );

    let normalized = normalizer.normalize(&blob, tracker).await?;
    let user_response = transcriber
        .transcribe(&normalized, expectation.language)
        .await?;

    let canonical_response = normalize_text(&user_response);
    let canonical_answer = normalize_text(&expectation.expected_answer);
    let score = similarity(&canonical_response, &canonical_answer);
    debug!(
        %user_response,
        expected = %expectation.expected_answer,
        score,
        "scored answer"
    );

    Ok(VerificationResult {
        user_response,
        is_correct: is_correct(score),
        correct_answer: expectation.expected_answer,
        pronunciation_score: pronunciation_score(score),
        metadata: expectation.entry,
    })
}
