//! HTTP API for the StudyBetter service.
//!
//! Endpoints:
//! - Health monitoring
//! - Document upload and text extraction
//! - Quiz and flashcard generation
//! - QuizPasa chat assistant

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::StaticConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{DocumentFormat, ExtractionOutcome, Extractor, SourceDocument, ocr};
use crate::generation::{
    self, ChatReply, Flashcard, Mcq, SessionMaterials, chat_reply, generate_flashcards,
    generate_mcqs,
};
use crate::groq::{ChatMessage, GroqClient};

const DEFAULT_QUESTION_COUNT: usize = 10;
const DEFAULT_FLASHCARD_COUNT: usize = 10;

/// Application state
pub struct AppState {
    pub extractor: Extractor,
    pub groq: GroqClient,
    pub config: StaticConfig,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(config: StaticConfig) -> ServiceResult<Router> {
    let extractor = Extractor::new(config.extraction.clone());
    let groq = GroqClient::new(config.groq.clone())?;

    let state = Arc::new(AppState {
        extractor,
        groq,
        config: config.clone(),
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_body_size = config.limits.max_upload_bytes as usize;

    let api_routes = Router::new()
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/quiz", post(quiz_handler))
        .route("/check_answer", post(check_answer_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/welcome", get(chat_welcome_handler))
        .route("/chat/tips", get(chat_tips_handler));

    Ok(Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ocr_available = ocr::engine().is_some();
    let status = if ocr_available {
        "healthy".to_string()
    } else {
        "degraded (OCR engine unavailable)".to_string()
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        ocr_available,
        groq_configured: state.groq.is_configured(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    ocr_available: bool,
    groq_configured: bool,
}

// === Upload & extraction ===

#[derive(Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub format: String,
    pub text: String,
    pub diagnostics: Vec<String>,
}

/// Accept one uploaded document, validate it, and run the extraction
/// cascade. The validator's reason is returned verbatim on rejection.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServiceError> {
    let (data, filename) = read_upload(multipart).await?;

    let extension = extension_of(&filename);
    let format =
        DocumentFormat::from_extension(extension).ok_or(ServiceError::UnsupportedFormat {
            extension: extension.to_string(),
        })?;

    let max = state.config.limits.max_upload_bytes;
    if data.len() as u64 > max {
        return Err(ServiceError::FileTooLarge {
            size: data.len() as u64,
            max,
        });
    }

    info!(filename = %filename, %format, bytes = data.len(), "Processing upload");

    let outcome = extract_on_blocking_pool(state.extractor.clone(), data, format).await?;

    if outcome.text.trim().is_empty() {
        return Err(ServiceError::NoExtractableText);
    }

    Ok(Json(UploadResponse {
        filename,
        format: format.to_string(),
        text: outcome.text,
        diagnostics: outcome.diagnostics,
    }))
}

/// Pull the `file` field out of the multipart body. Decode failures
/// (truncated body, bad boundary) surface as invalid-request errors
/// rather than being mistaken for a missing file.
async fn read_upload(mut multipart: Multipart) -> Result<(Vec<u8>, String), ServiceError> {
    let mut file_data: Option<(Vec<u8>, String)> = None;

    while let Some(field) =
        multipart
            .next_field()
            .await
            .map_err(|e| ServiceError::InvalidRequest {
                message: e.to_string(),
            })?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("document").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ServiceError::InvalidRequest {
                    message: e.to_string(),
                })?;
            file_data = Some((data.to_vec(), filename));
        }
    }

    file_data.ok_or_else(|| ServiceError::InvalidRequest {
        message: "No file provided".to_string(),
    })
}

/// Validation and the cascade are CPU-bound (and shell out to external
/// tools), so they run off the async runtime.
async fn extract_on_blocking_pool(
    extractor: Extractor,
    data: Vec<u8>,
    format: DocumentFormat,
) -> Result<ExtractionOutcome, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let document = SourceDocument {
            bytes: &data,
            format,
        };

        let verdict = extractor.validate(&document);
        if !verdict.valid {
            return Err(ServiceError::Validation {
                reason: verdict.reason,
            });
        }

        Ok(extractor.extract(&document))
    })
    .await
    .map_err(|e| ServiceError::Internal {
        message: format!("extraction task failed: {e}"),
    })?
}

fn extension_of(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

// === Quiz generation ===

#[derive(Deserialize)]
pub struct QuizRequest {
    pub text: String,
    pub num_questions: Option<usize>,
    pub num_flashcards: Option<usize>,
}

#[derive(Serialize)]
pub struct QuizResponse {
    pub mcqs: Vec<Mcq>,
    pub flashcards: Vec<Flashcard>,
}

/// Turn extracted text into MCQs and flashcards. Never fails outright;
/// content-based fallbacks cover every generation failure mode.
pub async fn quiz_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuizRequest>,
) -> Result<Json<QuizResponse>, ServiceError> {
    if request.text.trim().is_empty() {
        return Err(ServiceError::InvalidRequest {
            message: "No text provided for quiz generation".to_string(),
        });
    }

    let num_questions = request.num_questions.unwrap_or(DEFAULT_QUESTION_COUNT);
    let num_flashcards = request.num_flashcards.unwrap_or(DEFAULT_FLASHCARD_COUNT);

    let (mcqs, flashcards) = tokio::join!(
        generate_mcqs(&state.groq, &request.text, num_questions),
        generate_flashcards(&state.groq, &request.text, num_flashcards),
    );

    Ok(Json(QuizResponse { mcqs, flashcards }))
}

#[derive(Deserialize)]
pub struct CheckAnswerRequest {
    pub selected_option: usize,
    pub correct_answer: usize,
}

#[derive(Serialize)]
pub struct CheckAnswerResponse {
    pub is_correct: bool,
    pub correct_answer: usize,
}

pub async fn check_answer_handler(
    Json(request): Json<CheckAnswerRequest>,
) -> Json<CheckAnswerResponse> {
    Json(CheckAnswerResponse {
        is_correct: request.selected_option == request.correct_answer,
        correct_answer: request.correct_answer,
    })
}

// === Chat assistant ===

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(flatten)]
    pub materials: SessionMaterials,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatReply> {
    Json(
        chat_reply(
            &state.groq,
            &request.message,
            request.history,
            &request.materials,
        )
        .await,
    )
}

async fn chat_welcome_handler() -> Json<ChatReply> {
    Json(generation::welcome_message())
}

async fn chat_tips_handler() -> Json<ChatReply> {
    Json(generation::study_tips())
}
