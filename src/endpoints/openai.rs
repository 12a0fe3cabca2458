//! The OpenAI-compatible surface: `/v1/chat/completions`,
//! `/v1/completions`, `/v1/embeddings`, `/v1/models`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};

use crate::api::openai::{
    ChatCompletionChunk, ChatCompletionRequest, CompletionRequest, CompletionResponse,
    EmbeddingRequest, Model, ModelList, Usage,
};
use crate::dispatch;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::{AppState, StructuredJson};
use crate::inference::types::{completion_id, current_timestamp, GenerationOptions};
use crate::streaming;

/// A handler for `POST /v1/chat/completions`
pub async fn chat_completions_handler(
    State(state): AppState,
    StructuredJson(params): StructuredJson<ChatCompletionRequest>,
) -> Result<Response, Error> {
    let options = GenerationOptions::from_chat_request(&params);

    if params.stream {
        let target = dispatch::select_stream_target(&state, &params.model)?;
        let threshold = state.config.thresholds.failures_before_switch;
        let upstream = match target
            .provider
            .stream_chat(
                &state.http_client,
                &target.upstream_model,
                &params.messages,
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

        // Identity is fixed for the lifetime of the stream; the model echoes
        // the client-requested logical name.
        let id = completion_id("chatcmpl-");
        let created = current_timestamp();
        let model = params.model.clone();
        let events = streaming::sse_pump(
            streaming::spawn_producer(upstream),
            move |chunk: &mut ChatCompletionChunk| {
                chunk.id = id.clone();
                chunk.object = "chat.completion.chunk".to_string();
                chunk.created = created;
                chunk.model = model.clone();
            },
            Arc::clone(&state.tracker),
            target.key.clone(),
            threshold,
        );
        return Ok(streaming::sse_response(events));
    }

    let mut response = dispatch::chat(&state, &params.model, &params.messages, &options).await?;
    response.model = params.model;
    Ok(Json(response).into_response())
}

/// Usage totals accumulated across a batch of prompts.
fn merge_usage(a: Option<Usage>, b: Option<Usage>) -> Option<Usage> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Usage {
            prompt_tokens: a.prompt_tokens + b.prompt_tokens,
            completion_tokens: a.completion_tokens + b.completion_tokens,
            total_tokens: a.total_tokens + b.total_tokens,
        }),
        (a, b) => a.or(b),
    }
}

/// A handler for `POST /v1/completions`
///
/// `prompt` may be a string or an array. A non-streaming batch dispatches
/// each prompt through the chain in order and returns one choice per
/// prompt; streaming requires a single prompt.
pub async fn completions_handler(
    State(state): AppState,
    StructuredJson(params): StructuredJson<CompletionRequest>,
) -> Result<Response, Error> {
    let options = GenerationOptions::from_completion_request(&params);
    let prompts = params.prompt.clone().into_vec();
    if prompts.is_empty() {
        return Err(Error::new(ErrorDetails::InvalidRequest {
            message: "prompt must not be empty".to_string(),
        }));
    }

    if params.stream {
        if prompts.len() > 1 {
            return Err(Error::new(ErrorDetails::InvalidRequest {
                message: "streaming is not supported with more than one prompt".to_string(),
            }));
        }
        let target = dispatch::select_stream_target(&state, &params.model)?;
        let threshold = state.config.thresholds.failures_before_switch;
        let upstream = match target
            .provider
            .stream_complete(
                &state.http_client,
                &target.upstream_model,
                &prompts[0],
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

        let id = completion_id("cmpl-");
        let created = current_timestamp();
        let model = params.model.clone();
        let events = streaming::sse_pump(
            streaming::spawn_producer(upstream),
            move |chunk: &mut CompletionResponse| {
                chunk.id = id.clone();
                chunk.object = "text_completion".to_string();
                chunk.created = created;
                chunk.model = model.clone();
            },
            Arc::clone(&state.tracker),
            target.key.clone(),
            threshold,
        );
        return Ok(streaming::sse_response(events));
    }

    // One chain dispatch per prompt; choices are merged in prompt order
    let mut merged: Option<CompletionResponse> = None;
    for prompt in &prompts {
        let response = dispatch::complete(&state, &params.model, prompt, &options).await?;
        merged = Some(match merged {
            None => response,
            Some(mut acc) => {
                acc.choices.extend(response.choices);
                acc.usage = merge_usage(acc.usage, response.usage);
                acc
            }
        });
    }
    let Some(mut response) = merged else {
        return Err(Error::new(ErrorDetails::InvalidRequest {
            message: "prompt must not be empty".to_string(),
        }));
    };
    for (i, choice) in response.choices.iter_mut().enumerate() {
        choice.index = i as u32;
    }
    response.model = params.model;
    Ok(Json(response).into_response())
}

/// A handler for `POST /v1/embeddings`
pub async fn embeddings_handler(
    State(state): AppState,
    StructuredJson(params): StructuredJson<EmbeddingRequest>,
) -> Result<Response, Error> {
    let inputs = params.input.clone().into_vec();
    if inputs.is_empty() {
        return Err(Error::new(ErrorDetails::InvalidRequest {
            message: "input must not be empty".to_string(),
        }));
    }
    let mut response = dispatch::embed(&state, &params.model, &inputs).await?;
    response.model = params.model;
    Ok(Json(response).into_response())
}

/// A handler for `GET /v1/models`
pub async fn list_models_handler(State(state): AppState) -> Json<ModelList> {
    let mut data: Vec<Model> = state
        .config
        .models
        .keys()
        .map(|name| Model::new(name.clone(), "openmodel"))
        .collect();
    data.sort_by(|a, b| a.id.cmp(&b.id));
    Json(ModelList {
        object: "list".to_string(),
        data,
    })
}

/// A handler for `GET /v1/models/{name}`
pub async fn get_model_handler(
    State(state): AppState,
    Path(name): Path<String>,
) -> Result<Json<Model>, Error> {
    if !state.config.models.contains_key(&name) {
        return Err(Error::new(ErrorDetails::UnknownModel { name }));
    }
    Ok(Json(Model::new(name, "openmodel")))
}
