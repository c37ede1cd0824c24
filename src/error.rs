//! Application error taxonomy and HTTP response mapping.
//!
//! Pipeline stages fail with one of the variants below; the orchestrator
//! never lets a partial result escape. Server-side diagnostics for
//! conversion and transcription failures are logged here and suppressed
//! from the client body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error model used throughout request parsing, the verification pipeline,
/// and collaborator adapters.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requested term matches no vocabulary entry in either direction.
    #[error("unknown word: {0}")]
    UnknownTerm(String),
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
        code: Option<String>,
    },
    #[error("{0}")]
    BadMultipart(String),
    /// Every conversion strategy failed; carries their combined diagnostics.
    #[error("audio conversion failed: {0}")]
    Conversion(String),
    /// Transcription collaborator failure (network, quota, language).
    #[error("transcription failed: {0}")]
    Transcription(String),
    /// Speech synthesis collaborator failure.
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Creates an `invalid_request_error` payload with status `400`.
    pub fn invalid_request(
        message: impl Into<String>,
        param: Option<&str>,
        code: Option<&str>,
    ) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: param.map(ToOwned::to_owned),
            code: code.map(ToOwned::to_owned),
        }
    }

    /// Creates a multipart parsing/shape validation error.
    pub fn bad_multipart(message: impl Into<String>) -> Self {
        Self::BadMultipart(message.into())
    }

    /// Creates a generic internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

fn client_error(message: String, param: Option<String>, code: Option<String>) -> ErrorPayload {
    ErrorPayload {
        error: ErrorBody {
            message,
            error_type: "invalid_request_error".to_string(),
            param,
            code,
        },
    }
}

fn server_error(message: String, code: &str) -> ErrorPayload {
    ErrorPayload {
        error: ErrorBody {
            message,
            error_type: "server_error".to_string(),
            param: None,
            code: Some(code.to_string()),
        },
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::UnknownTerm(word) => (
                StatusCode::BAD_REQUEST,
                client_error(
                    format!("unknown word: {word:?}"),
                    Some("word".to_string()),
                    Some("unknown_term".to_string()),
                ),
            ),
            AppError::InvalidRequest {
                message,
                param,
                code,
            } => (StatusCode::BAD_REQUEST, client_error(message, param, code)),
            AppError::BadMultipart(message) => (
                StatusCode::BAD_REQUEST,
                client_error(
                    message,
                    Some("file".to_string()),
                    Some("invalid_multipart".to_string()),
                ),
            ),
            AppError::Conversion(detail) => {
                tracing::error!(%detail, "audio conversion failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    server_error(
                        "failed to process audio file".to_string(),
                        "conversion_failed",
                    ),
                )
            }
            AppError::Transcription(detail) => {
                tracing::error!(%detail, "transcription failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    server_error(
                        "failed to transcribe audio".to_string(),
                        "transcription_failed",
                    ),
                )
            }
            AppError::Synthesis(detail) => {
                tracing::error!(%detail, "speech synthesis failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    server_error(
                        "failed to synthesize speech".to_string(),
                        "synthesis_failed",
                    ),
                )
            }
            AppError::Internal(message) => {
                tracing::error!(%message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    server_error(message, "internal_error"),
                )
            }
        };

        (status, Json(payload)).into_response()
    }
}
