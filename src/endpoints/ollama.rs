//! The Ollama-native surface: `/api/chat`, `/api/generate`, `/api/embed`,
//! plus the small discovery endpoints (`/api/tags`, `/api/version`,
//! `/api/ps`, `/api/show`).
//!
//! These routes speak Ollama envelopes on the wire and go through the
//! format bridge around the same dispatch core as the `/v1/*` surface.
//! Streaming defaults to on, matching Ollama's behavior.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde_json::json;

use crate::api::ollama::{
    ChatRequest, EmbedRequest, GenerateRequest, ListModelResponse, ListResponse, ModelDetails,
    VersionResponse,
};
use crate::api::openai::ResponseFormat;
use crate::bridge;
use crate::dispatch;
use crate::endpoints::status::VERSION;
use crate::error::Error;
use crate::gateway_util::{AppState, StructuredJson};
use crate::inference::types::GenerationOptions;
use crate::streaming;

fn options_from_request(
    options: Option<&crate::api::ollama::Options>,
    format: Option<&str>,
) -> GenerationOptions {
    let mut generation = options
        .map(GenerationOptions::from_ollama)
        .unwrap_or_default();
    if format == Some("json") {
        generation.response_format = Some(ResponseFormat {
            r#type: "json_object".to_string(),
            json_schema: None,
        });
    }
    generation
}

/// A handler for `POST /api/chat`
pub async fn chat_handler(
    State(state): AppState,
    StructuredJson(params): StructuredJson<ChatRequest>,
) -> Result<Response, Error> {
    let messages = bridge::messages_to_openai(&params.messages);
    let options = options_from_request(params.options.as_ref(), params.format.as_deref());
    let stream = params.stream.unwrap_or(true);

    if stream {
        let target = dispatch::select_stream_target(&state, &params.model)?;
        let threshold = state.config.thresholds.failures_before_switch;
        let upstream = match target
            .provider
            .stream_chat(&state.http_client, &target.upstream_model, &messages, &options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                return Err(streaming::fail_before_commit(
                    &state.tracker,
                    &target.key,
                    threshold,
                    e,
                ))
            }
        };

        let model = params.model.clone();
        let lines = streaming::ndjson_pump(
            streaming::spawn_producer(upstream),
            move |chunk| bridge::chat_chunk_to_ollama(&chunk, &model),
            Arc::clone(&state.tracker),
            target.key.clone(),
            threshold,
        );
        return Ok(streaming::ndjson_response(lines));
    }

    let response = dispatch::chat(&state, &params.model, &messages, &options).await?;
    Ok(Json(bridge::chat_response_to_ollama(&response, &params.model)).into_response())
}

/// A handler for `POST /api/generate`
pub async fn generate_handler(
    State(state): AppState,
    StructuredJson(params): StructuredJson<GenerateRequest>,
) -> Result<Response, Error> {
    let options = options_from_request(params.options.as_ref(), params.format.as_deref());
    let stream = params.stream.unwrap_or(true);

    if stream {
        let target = dispatch::select_stream_target(&state, &params.model)?;
        let threshold = state.config.thresholds.failures_before_switch;
        let upstream = match target
            .provider
            .stream_complete(
                &state.http_client,
                &target.upstream_model,
                &params.prompt,
                &options,
            )
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                return Err(streaming::fail_before_commit(
                    &state.tracker,
                    &target.key,
                    threshold,
                    e,
                ))
            }
        };

        let model = params.model.clone();
        let lines = streaming::ndjson_pump(
            streaming::spawn_producer(upstream),
            move |chunk| bridge::completion_chunk_to_generate(&chunk, &model),
            Arc::clone(&state.tracker),
            target.key.clone(),
            threshold,
        );
        return Ok(streaming::ndjson_response(lines));
    }

    let response = dispatch::complete(&state, &params.model, &params.prompt, &options).await?;
    Ok(Json(bridge::completion_response_to_generate(&response, &params.model)).into_response())
}

/// A handler for `POST /api/embed` (and its `/api/embeddings` alias)
pub async fn embed_handler(
    State(state): AppState,
    StructuredJson(params): StructuredJson<EmbedRequest>,
) -> Result<Response, Error> {
    let inputs = params.input.clone().into_vec();
    let response = dispatch::embed(&state, &params.model, &inputs).await?;
    Ok(Json(bridge::embedding_response_to_ollama(&response, &params.model)).into_response())
}

/// A handler for `GET /api/tags`
pub async fn tags_handler(State(state): AppState) -> Json<ListResponse> {
    let mut models: Vec<ListModelResponse> = state
        .config
        .models
        .keys()
        .map(|name| ListModelResponse {
            name: name.clone(),
            model: name.clone(),
            modified_at: Utc::now(),
            digest: "openmodel-virtual".to_string(),
            details: ModelDetails {
                family: "openmodel".to_string(),
                ..Default::default()
            },
            ..Default::default()
        })
        .collect();
    models.sort_by(|a, b| a.name.cmp(&b.name));
    Json(ListResponse { models })
}

/// A handler for `GET /api/version`
pub async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: VERSION.to_string(),
    })
}

/// A handler for `GET /api/ps`
pub async fn ps_handler() -> Json<serde_json::Value> {
    Json(json!({ "models": [] }))
}

/// A handler for `POST /api/show`; model management is not part of this
/// gateway.
pub async fn show_handler() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "error": "not implemented",
            "detail": "/api/show endpoint is not yet implemented",
        })),
    )
        .into_response()
}
