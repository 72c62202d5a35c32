use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("{reason}")]
    Validation { reason: String },

    #[error(
        "No text could be extracted from the file. The document may be password \
         protected, scanned without OCR available, corrupted, or contain no text content."
    )]
    NoExtractableText,

    #[error("{0}")]
    Groq(#[from] GroqError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Groq API client errors
#[derive(Error, Debug)]
pub enum GroqError {
    #[error("Groq API key is not configured")]
    NotConfigured,

    #[error("Connection failed to Groq at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from Groq")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },
}

/// Failures raised by a single extraction capability (a parser, a decoder,
/// an external tool). These never cross the orchestrator boundary; they are
/// logged and converted into diagnostics at each unit.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF engine unavailable: {0}")]
    PdfiumUnavailable(String),

    #[error("failed to open document: {0}")]
    DocumentOpen(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("conversion tool failed: {0}")]
    Tool(String),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Validation { .. } | ServiceError::NoExtractableText => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Groq(GroqError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::UnsupportedFormat { .. } => "unsupported_format",
            ServiceError::FileTooLarge { .. } => "file_too_large",
            ServiceError::Validation { .. } => "validation_failed",
            ServiceError::NoExtractableText => "no_extractable_text",
            ServiceError::Groq(GroqError::NotConfigured) => "groq_not_configured",
            ServiceError::Groq(GroqError::Connection { .. }) => "groq_connection",
            ServiceError::Groq(GroqError::Generation { .. }) => "groq_generation",
            ServiceError::Groq(GroqError::InvalidResponse { .. }) => "groq_invalid_response",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
