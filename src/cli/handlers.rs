// HTTP Handlers Module
// Implements the OpenAI-compatible chat endpoint and the mocker's admin endpoints.

use super::config::Config;
use super::state::AppState;
use super::store::ModelUpdate;
use crate::{
    generator::fit_to_duration,
    openai::{ChatCompletionRequest, ErrorResponse, Model, ModelsResponse},
    pacer::StreamPacerBuilder,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const OWNED_BY: &str = "openai-stream-mocker";

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "OpenAI Stream Mocker",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "stream-mocker"
    }))
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, AppError> {
    let request_start = Instant::now();
    let config = state.store.snapshot();

    tracing::info!(
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        response_length = request.response_length.as_deref(),
        "Chat completion request"
    );

    state
        .stats
        .record_request_start(&request.model, request.stream);

    if config.general.strict_models
        && !config.is_known_model(&request.model)
        && !request.model.contains(':')
    {
        state.stats.record_error();
        return Err(AppError::ModelNotFound(request.model));
    }

    if let Some(seconds) = request.duration_seconds {
        if !seconds.is_finite() || seconds < 0.0 {
            state.stats.record_error();
            return Err(AppError::BadRequest(format!(
                "duration_seconds must be a non-negative number, got {}",
                seconds
            )));
        }
    }

    let settings = config.session_settings(&request.model);
    let content = response_content(&config, &request, settings.tokens_per_second);
    let stream = request.stream;

    let builder = StreamPacerBuilder::new(request.model, content)
        .settings(settings)
        .prompt(request.messages);

    if stream {
        let stats = state.stats.clone();
        let abort_stats = state.stats.clone();

        let pacer = builder
            .on_complete(move |summary| {
                stats.record_stream_finished(summary, request_start.elapsed());
            })
            .on_abort(move || abort_stats.record_stream_aborted())
            .build();

        tracing::debug!(
            id = pacer.id(),
            rate = pacer.settings().tokens_per_second,
            budget_secs = pacer.settings().time_budget.as_secs_f64(),
            "Starting stream"
        );

        let body = Body::from_stream(pacer.into_stream().map(Ok::<_, std::io::Error>));

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(body)
            .map_err(|e| AppError::Internal(e.to_string()))
    } else {
        let response = builder.build().materialize();

        state.stats.record_request_end(
            request_start.elapsed(),
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
        );

        Ok(Json(response).into_response())
    }
}

/// Text to answer with, chosen from the response library and optionally
/// resized to the requested duration
fn response_content(config: &Config, request: &ChatCompletionRequest, tokens_per_second: f64) -> String {
    let length = request
        .response_length
        .as_deref()
        .unwrap_or(&config.general.default_response_mode);

    let content = config.response_library().select(
        length,
        tokens_per_second,
        &config.auto_response_length,
    );

    match request.duration_seconds {
        Some(seconds) => fit_to_duration(&content, tokens_per_second, seconds),
        None => content,
    }
}

/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.store.snapshot();
    let models: Vec<Model> = config
        .models
        .keys()
        .map(|id| Model::new(id, OWNED_BY).with_description(config.model_description(id)))
        .collect();

    Json(ModelsResponse::new(models))
}

/// GET /stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

/// GET /config
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.store.snapshot();
    Json(json!({
        "default": config.default_model(),
        "models": config.models,
    }))
}

/// GET /config/{model}
pub async fn get_model_config(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
) -> Result<Response, AppError> {
    let config = state.store.snapshot();
    if let Some(model_config) = config.models.get(&model) {
        Ok(Json(model_config).into_response())
    } else if model == "default" {
        Ok(Json(config.default_model()).into_response())
    } else {
        Err(AppError::NotFound(format!("Model {} not found", model)))
    }
}

/// Body of POST /config
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdateRequest {
    pub model: Option<String>,
    pub tokens_per_second: Option<f64>,
    /// Parameter count in billions; the rate is estimated from it
    pub parameters: Option<f64>,
    pub description: Option<String>,
}

/// POST /config
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdateRequest>,
) -> impl IntoResponse {
    let message = match update {
        ConfigUpdateRequest {
            model: Some(model),
            tokens_per_second: Some(rate),
            description,
            ..
        } => match state.store.set_model_rate(&model, rate, description) {
            ModelUpdate::Updated => {
                format!("Tokens per second for model {} updated to {}", model, rate)
            }
            ModelUpdate::Added => {
                format!("Added new model {} with {} tokens per second", model, rate)
            }
        },
        ConfigUpdateRequest {
            model: Some(model),
            parameters: Some(params),
            description,
            ..
        } => match state.store.set_model_parameters(&model, params, description) {
            (ModelUpdate::Updated, speed) => format!(
                "Updated {} with {}B parameters, estimated speed: {:.2} tokens/sec",
                model, params, speed
            ),
            (ModelUpdate::Added, speed) => format!(
                "Added model {} with {}B parameters, estimated speed: {:.2} tokens/sec",
                model, params, speed
            ),
        },
        ConfigUpdateRequest {
            model: None,
            tokens_per_second: Some(rate),
            ..
        } => {
            state.store.set_default_rate(rate);
            format!("Default tokens per second updated to {}", rate)
        }
        _ => "No changes made".to_string(),
    };

    tracing::info!(%message, "Configuration updated");
    Json(json!({ "message": message }))
}

/// POST /config/reload
pub async fn reload_config(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let config = match &state.config_path {
        Some(path) => Config::from_file(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Configuration reload failed");
            AppError::Internal(e.to_string())
        })?,
        None => Config::default(),
    };

    state.store.replace(config);
    tracing::info!("Configuration reloaded");
    Ok(Json(json!({ "message": "Configuration reloaded successfully" })).into_response())
}

/// GET /responses
pub async fn list_responses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.snapshot().response_library().previews())
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("Model '{0}' does not exist")]
    ModelNotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(msg, "not_found_error"),
            ),
            AppError::ModelNotFound(model) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::model_not_found(&model),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::invalid_request(msg))
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(msg, "internal_error"),
            ),
        };

        let mut response = Json(error_response).into_response();
        *response.status_mut() = status;
        response
    }
}
