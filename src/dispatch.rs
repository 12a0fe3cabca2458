//! The dispatch core: walk a logical model's target chain strictly in
//! configured order, skip targets that are marked unavailable or whose
//! provider is missing, invoke the first viable one, and fall through to
//! the next target on failure. Exhausting the chain produces a retryable
//! 503 and advances the progressive back-off.

use tokio::time::Instant;

use crate::api::openai::{
    ChatCompletionResponse, ChatMessage, CompletionResponse, EmbeddingResponse,
};
use crate::config::ModelTarget;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::AppStateData;
use crate::inference::providers::ProviderClient;
use crate::inference::types::GenerationOptions;
use crate::state::target_key;

fn lookup_chain<'a>(state: &'a AppStateData, model: &str) -> Result<&'a [ModelTarget], Error> {
    state
        .config
        .models
        .get(model)
        .map(Vec::as_slice)
        .ok_or_else(|| {
            Error::new(ErrorDetails::UnknownModel {
                name: model.to_string(),
            })
        })
}

/// Consumes the progressive timeout and converts the last target error into
/// the client-facing 503. Called exactly once per exhausted dispatch.
fn handle_exhaustion(state: &AppStateData, last_error: Option<Error>) -> Error {
    let timeout_ms = state.tracker.progressive_timeout_ms();
    state
        .tracker
        .advance_timeout(state.config.thresholds.max_timeout_ms);
    Error::new(ErrorDetails::ChainExhausted {
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all providers failed".to_string()),
        retry_after_secs: timeout_ms / 1000,
    })
}

pub async fn chat(
    state: &AppStateData,
    logical_model: &str,
    messages: &[ChatMessage],
    options: &GenerationOptions,
) -> Result<ChatCompletionResponse, Error> {
    let chain = lookup_chain(state, logical_model)?;
    let threshold = state.config.thresholds.failures_before_switch;
    let mut last_error = None;

    for target in chain {
        let key = target_key(&target.provider, &target.model);
        if !state.tracker.is_available(&key, threshold) {
            continue;
        }
        let Some(provider) = state.providers.get(&target.provider) else {
            tracing::debug!(backend = %key, "Skipping target with unconfigured provider");
            continue;
        };

        let start = Instant::now();
        match provider
            .chat(&state.http_client, &target.model, messages, options)
            .await
        {
            Ok(response) => {
                state.tracker.reset(&key);
                tracing::debug!(backend = %key, model = %logical_model, latency = ?start.elapsed(), "Chat completed");
                return Ok(response);
            }
            Err(e) => {
                tracing::warn!(backend = %key, model = %logical_model, error = %e, latency = ?start.elapsed(), "Chat failed");
                state.tracker.record_failure(&key, threshold);
                last_error = Some(e);
            }
        }
    }

    Err(handle_exhaustion(state, last_error))
}

pub async fn complete(
    state: &AppStateData,
    logical_model: &str,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<CompletionResponse, Error> {
    let chain = lookup_chain(state, logical_model)?;
    let threshold = state.config.thresholds.failures_before_switch;
    let mut last_error = None;

    for target in chain {
        let key = target_key(&target.provider, &target.model);
        if !state.tracker.is_available(&key, threshold) {
            continue;
        }
        let Some(provider) = state.providers.get(&target.provider) else {
            tracing::debug!(backend = %key, "Skipping target with unconfigured provider");
            continue;
        };

        let start = Instant::now();
        match provider
            .complete(&state.http_client, &target.model, prompt, options)
            .await
        {
            Ok(response) => {
                state.tracker.reset(&key);
                tracing::debug!(backend = %key, model = %logical_model, latency = ?start.elapsed(), "Completion completed");
                return Ok(response);
            }
            Err(e) => {
                tracing::warn!(backend = %key, model = %logical_model, error = %e, latency = ?start.elapsed(), "Completion failed");
                state.tracker.record_failure(&key, threshold);
                last_error = Some(e);
            }
        }
    }

    Err(handle_exhaustion(state, last_error))
}

pub async fn embed(
    state: &AppStateData,
    logical_model: &str,
    inputs: &[String],
) -> Result<EmbeddingResponse, Error> {
    let chain = lookup_chain(state, logical_model)?;
    let threshold = state.config.thresholds.failures_before_switch;
    let mut last_error = None;

    for target in chain {
        let key = target_key(&target.provider, &target.model);
        if !state.tracker.is_available(&key, threshold) {
            continue;
        }
        let Some(provider) = state.providers.get(&target.provider) else {
            tracing::debug!(backend = %key, "Skipping target with unconfigured provider");
            continue;
        };

        let start = Instant::now();
        match provider
            .embed(&state.http_client, &target.model, inputs)
            .await
        {
            Ok(response) => {
                state.tracker.reset(&key);
                tracing::debug!(backend = %key, model = %logical_model, latency = ?start.elapsed(), "Embedding completed");
                return Ok(response);
            }
            Err(e) => {
                tracing::warn!(backend = %key, model = %logical_model, error = %e, latency = ?start.elapsed(), "Embedding failed");
                state.tracker.record_failure(&key, threshold);
                last_error = Some(e);
            }
        }
    }

    Err(handle_exhaustion(state, last_error))
}

/// The first viable target of a chain, for streaming operations: once the
/// pump takes over, the response is committed and dispatch never retries.
#[derive(Debug)]
pub struct StreamTarget<'a> {
    pub key: String,
    pub provider: &'a ProviderClient,
    pub upstream_model: String,
}

pub fn select_stream_target<'a>(
    state: &'a AppStateData,
    logical_model: &str,
) -> Result<StreamTarget<'a>, Error> {
    let chain = lookup_chain(state, logical_model)?;
    let threshold = state.config.thresholds.failures_before_switch;

    for target in chain {
        let key = target_key(&target.provider, &target.model);
        if !state.tracker.is_available(&key, threshold) {
            continue;
        }
        let Some(provider) = state.providers.get(&target.provider) else {
            tracing::debug!(backend = %key, "Skipping target with unconfigured provider");
            continue;
        };
        return Ok(StreamTarget {
            key,
            provider,
            upstream_model: target.model.clone(),
        });
    }

    Err(handle_exhaustion(state, None))
}
