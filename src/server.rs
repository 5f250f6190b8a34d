//! HTTP API
//!
//! JSON endpoints for recipe generation and speech synthesis, plus streaming
//! variants (server-sent events for text, chunked `audio/wav` for speech).

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::call_log::CallLog;
use crate::config::Settings;
use crate::dashscope::DashScopeClient;
use crate::error::TtsError;
use crate::generation::DashScopeChat;
use crate::pipeline::TtsService;
use crate::recipe::{Recipe, RecipeEvent, RecipeGenerator, RecipeRequest};
use crate::tts::{DEFAULT_VOICE, DashScopeSpeech};

const DOWNLOAD_NAME: &str = "recipe_audio.wav";

#[derive(Clone)]
pub struct AppState {
    pub tts: TtsService,
    pub recipes: RecipeGenerator,
}

impl AppState {
    pub fn new(tts: TtsService, recipes: RecipeGenerator) -> Self {
        Self { tts, recipes }
    }

    /// Wire the DashScope clients and the call log from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let client = DashScopeClient::new(&settings.api_key, &settings.base_url);
        let log = Arc::new(CallLog::new(&settings.log_dir));
        let speech = Arc::new(DashScopeSpeech::new(client.clone(), &settings.tts_model));
        let chat = Arc::new(DashScopeChat::new(client, &settings.chat_model));

        Self::new(
            TtsService::new(speech, Arc::clone(&log), settings.max_segment_chars),
            RecipeGenerator::new(chat, log),
        )
    }
}

/// Error payload returned to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    /// Body missing, not JSON, or the wrong shape.
    Rejected(JsonRejection),
    Internal(TtsError),
}

impl From<TtsError> for ApiError {
    fn from(e: TtsError) -> Self {
        ApiError::Internal(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(TtsError::Io(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.to_string()),
            ApiError::Rejected(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::Internal(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate-recipe", post(generate_recipe))
        .route("/api/stream-recipe", post(stream_recipe))
        .route("/api/text-to-speech", post(text_to_speech))
        .route("/api/stream-tts", post(stream_tts))
        .route("/api/download-tts", post(download_tts))
        .route("/favicon.ico", get(favicon))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn require_ingredients(request: &RecipeRequest) -> Result<(), ApiError> {
    if request.ingredients.is_empty() {
        return Err(ApiError::BadRequest("No ingredients provided"));
    }
    Ok(())
}

async fn generate_recipe(
    State(state): State<AppState>,
    payload: Result<Json<RecipeRequest>, JsonRejection>,
) -> Result<Json<Recipe>, ApiError> {
    let Json(request) = payload?;
    require_ingredients(&request)?;
    let recipe = state.recipes.generate(&request).await?;
    Ok(Json(recipe))
}

async fn stream_recipe(
    State(state): State<AppState>,
    payload: Result<Json<RecipeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    require_ingredients(&request)?;

    let events = state.recipes.generate_stream(&request).map(|item| {
        item.map(|event| match event {
            RecipeEvent::Chunk(chunk) => Event::default().data(json!({ "chunk": chunk }).to_string()),
            RecipeEvent::Done(recipe) => {
                Event::default().data(json!({ "recipe": recipe }).to_string())
            }
        })
    });
    Ok(Sse::new(events).into_response())
}

#[derive(Debug, Deserialize)]
struct SpeechRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    voice: Option<String>,
}

impl SpeechRequest {
    fn validated(&self) -> Result<(&str, &str), ApiError> {
        if self.text.is_empty() {
            return Err(ApiError::BadRequest("No text provided"));
        }
        Ok((&self.text, self.voice.as_deref().unwrap_or(DEFAULT_VOICE)))
    }
}

#[derive(Debug, Serialize)]
struct SpeechUrls {
    audio_urls: Vec<String>,
}

async fn text_to_speech(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Json<SpeechUrls>, ApiError> {
    let Json(request) = payload?;
    let (text, voice) = request.validated()?;
    let audio_urls = state.tts.synthesize(text, voice).await?;
    Ok(Json(SpeechUrls { audio_urls }))
}

async fn stream_tts(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let (text, voice) = request.validated()?;
    let chunks = state.tts.synthesize_stream(text, voice);

    Ok((
        [(header::CONTENT_TYPE, "audio/wav")],
        Body::from_stream(chunks),
    )
        .into_response())
}

async fn download_tts(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let (text, voice) = request.validated()?;

    // Removed when `temp` drops, after the bytes are in memory.
    let temp = tempfile::Builder::new().suffix(".wav").tempfile()?;
    state.tts.synthesize_to_file(text, voice, temp.path()).await?;
    let audio = tokio::fs::read(temp.path()).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_NAME),
            ),
        ],
        audio,
    )
        .into_response())
}
