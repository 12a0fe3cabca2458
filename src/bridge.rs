//! Bi-directional translation between Ollama-native and OpenAI-style
//! envelopes, so either front-end protocol can be served from either
//! upstream dialect.
//!
//! These functions are pure and total: every supported field has a defined
//! mapping or an explicit default.

use chrono::{DateTime, TimeZone, Utc};

use crate::api::ollama;
use crate::api::openai::{
    ChatCompletionChoice, ChatCompletionChunk, ChatCompletionResponse, ChatMessage,
    CompletionChoice, CompletionResponse, EmbeddingData, EmbeddingResponse, Usage,
};
use crate::inference::types::{completion_id, current_timestamp};

fn timestamp_to_datetime(created: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(created as i64, 0)
        .single()
        .unwrap_or_default()
}

pub fn messages_to_openai(messages: &[ollama::Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
            name: None,
            images: m.images.clone(),
        })
        .collect()
}

pub fn messages_to_ollama(messages: &[ChatMessage]) -> Vec<ollama::Message> {
    messages
        .iter()
        .map(|m| ollama::Message {
            role: m.role.clone(),
            content: m.content.clone(),
            images: m.images.clone(),
        })
        .collect()
}

/// Inverse of [`GenerationOptions::from_ollama`]; options with no Ollama
/// counterpart (tools, logit bias, user tag) are dropped.
pub fn options_to_ollama(
    options: &crate::inference::types::GenerationOptions,
) -> Option<ollama::Options> {
    let mapped = ollama::Options {
        temperature: options.temperature,
        top_p: options.top_p,
        top_k: options.top_k,
        num_predict: options.max_tokens,
        stop: options.stop.clone(),
        seed: options.seed,
        presence_penalty: options.presence_penalty,
        frequency_penalty: options.frequency_penalty,
        ..Default::default()
    };
    (mapped != ollama::Options::default()).then_some(mapped)
}

fn usage_to_metrics(usage: &Option<Usage>) -> Option<ollama::Metrics> {
    usage.as_ref().map(|u| ollama::Metrics {
        prompt_eval_count: u.prompt_tokens,
        eval_count: u.completion_tokens,
        ..Default::default()
    })
}

fn metrics_to_usage(metrics: &Option<ollama::Metrics>) -> Option<Usage> {
    metrics.as_ref().map(|m| Usage {
        prompt_tokens: m.prompt_eval_count,
        completion_tokens: m.eval_count,
        total_tokens: m.prompt_eval_count + m.eval_count,
    })
}

/// Takes `choices[0]` of an OpenAI chat response and renders it as an
/// Ollama chat response. `done` reflects the presence of a finish reason.
pub fn chat_response_to_ollama(
    response: &ChatCompletionResponse,
    model: &str,
) -> ollama::ChatResponse {
    let choice = response.choices.first();
    ollama::ChatResponse {
        model: model.to_string(),
        created_at: timestamp_to_datetime(response.created),
        message: choice.map(|c| ollama::Message {
            role: c.message.role.clone(),
            content: c.message.content.clone(),
            images: None,
        }),
        done: choice.map(|c| c.finish_reason.is_some()).unwrap_or(true),
        metrics: usage_to_metrics(&response.usage),
    }
}

/// Per choice, one Ollama chat response with `done` set iff the chunk
/// carries a finish reason.
pub fn chat_chunk_to_ollama(chunk: &ChatCompletionChunk, model: &str) -> Vec<ollama::ChatResponse> {
    chunk
        .choices
        .iter()
        .map(|choice| ollama::ChatResponse {
            model: model.to_string(),
            created_at: timestamp_to_datetime(chunk.created),
            message: Some(ollama::Message {
                role: choice
                    .delta
                    .role
                    .clone()
                    .unwrap_or_else(|| "assistant".to_string()),
                content: choice.delta.content.clone().unwrap_or_default(),
                images: None,
            }),
            done: choice.finish_reason.is_some(),
            metrics: None,
        })
        .collect()
}

/// Synthesizes an OpenAI chat response from an Ollama one: fresh
/// `chatcmpl-` id, `object: "chat.completion"`, single choice finishing
/// with "stop".
pub fn ollama_chat_to_openai(
    response: &ollama::ChatResponse,
    model: &str,
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: completion_id("chatcmpl-"),
        object: "chat.completion".to_string(),
        created: current_timestamp(),
        model: model.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatMessage {
                role: response
                    .message
                    .as_ref()
                    .map(|m| m.role.clone())
                    .unwrap_or_else(|| "assistant".to_string()),
                content: response
                    .message
                    .as_ref()
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
                name: None,
                images: None,
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: metrics_to_usage(&response.metrics),
    }
}

/// One streamed OpenAI chat chunk per Ollama chunk; the stream's `id` and
/// `created` are supplied by the caller so they stay fixed across chunks.
pub fn ollama_chat_chunk_to_openai(
    response: &ollama::ChatResponse,
    id: &str,
    created: u64,
    model: &str,
) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![crate::api::openai::ChatCompletionChunkChoice {
            index: 0,
            delta: crate::api::openai::ChatCompletionDelta {
                role: Some("assistant".to_string()),
                content: response.message.as_ref().map(|m| m.content.clone()),
                tool_calls: None,
            },
            finish_reason: response.done.then(|| "stop".to_string()),
        }],
        usage: metrics_to_usage(&response.metrics),
    }
}

pub fn ollama_generate_to_completion(
    response: &ollama::GenerateResponse,
    model: &str,
) -> CompletionResponse {
    CompletionResponse {
        id: completion_id("cmpl-"),
        object: "text_completion".to_string(),
        created: current_timestamp(),
        model: model.to_string(),
        choices: vec![CompletionChoice {
            text: response.response.clone(),
            index: 0,
            finish_reason: Some("stop".to_string()),
        }],
        usage: metrics_to_usage(&response.metrics),
    }
}

/// One streamed completion chunk per Ollama generate chunk; stream identity
/// is supplied by the caller.
pub fn ollama_generate_chunk_to_completion(
    response: &ollama::GenerateResponse,
    id: &str,
    created: u64,
    model: &str,
) -> CompletionResponse {
    CompletionResponse {
        id: id.to_string(),
        object: "text_completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![CompletionChoice {
            text: response.response.clone(),
            index: 0,
            finish_reason: response.done.then(|| "stop".to_string()),
        }],
        usage: metrics_to_usage(&response.metrics),
    }
}

pub fn completion_response_to_generate(
    response: &CompletionResponse,
    model: &str,
) -> ollama::GenerateResponse {
    let choice = response.choices.first();
    ollama::GenerateResponse {
        model: model.to_string(),
        created_at: timestamp_to_datetime(response.created),
        response: choice.map(|c| c.text.clone()).unwrap_or_default(),
        done: choice.map(|c| c.finish_reason.is_some()).unwrap_or(true),
        metrics: usage_to_metrics(&response.usage),
    }
}

/// Per choice/chunk variant of [`completion_response_to_generate`].
pub fn completion_chunk_to_generate(
    chunk: &CompletionResponse,
    model: &str,
) -> Vec<ollama::GenerateResponse> {
    chunk
        .choices
        .iter()
        .map(|choice| ollama::GenerateResponse {
            model: model.to_string(),
            created_at: timestamp_to_datetime(chunk.created),
            response: choice.text.clone(),
            done: choice.finish_reason.is_some(),
            metrics: None,
        })
        .collect()
}

/// Preserves input order: `data[i].index == i`.
pub fn ollama_embed_to_openai(response: &ollama::EmbedResponse, model: &str) -> EmbeddingResponse {
    EmbeddingResponse {
        object: "list".to_string(),
        data: response
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, embedding)| EmbeddingData {
                object: "embedding".to_string(),
                index: i as u32,
                embedding: embedding.clone(),
            })
            .collect(),
        model: model.to_string(),
        usage: None,
    }
}

pub fn embedding_response_to_ollama(
    response: &EmbeddingResponse,
    model: &str,
) -> ollama::EmbedResponse {
    ollama::EmbedResponse {
        model: model.to_string(),
        embeddings: response.data.iter().map(|d| d.embedding.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_response() -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: "chatcmpl-abc12345".to_string(),
            object: "chat.completion".to_string(),
            created: 1_700_000_000,
            model: "gpt-4o-mini".to_string(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: "Hello there".to_string(),
                    ..Default::default()
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens: 12,
                completion_tokens: 5,
                total_tokens: 17,
            }),
        }
    }

    #[test]
    fn test_round_trip_preserves_supported_fields() {
        // openai -> ollama -> openai is identity on
        // {role, content, finish_reason, prompt_eval_count, eval_count}
        let original = openai_response();
        let ollama = chat_response_to_ollama(&original, "my-model");
        let back = ollama_chat_to_openai(&ollama, "my-model");

        assert_eq!(back.choices[0].message.role, "assistant");
        assert_eq!(back.choices[0].message.content, "Hello there");
        assert_eq!(back.choices[0].finish_reason, Some("stop".to_string()));
        let usage = back.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 17);
    }

    #[test]
    fn test_chat_response_to_ollama_metrics() {
        let response = chat_response_to_ollama(&openai_response(), "my-model");
        assert_eq!(response.model, "my-model");
        assert!(response.done);
        let metrics = response.metrics.unwrap();
        assert_eq!(metrics.prompt_eval_count, 12);
        assert_eq!(metrics.eval_count, 5);
        assert_eq!(response.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_ollama_chat_to_openai_synthesizes_identity() {
        let response = ollama_chat_to_openai(
            &ollama::ChatResponse {
                model: "llama3.2".to_string(),
                created_at: Utc::now(),
                message: Some(ollama::Message {
                    role: "assistant".to_string(),
                    content: "hi".to_string(),
                    images: None,
                }),
                done: true,
                metrics: None,
            },
            "my-model",
        );
        assert!(response.id.starts_with("chatcmpl-"));
        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.model, "my-model");
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].finish_reason, Some("stop".to_string()));
    }

    #[test]
    fn test_chat_chunk_to_ollama_done_tracks_finish_reason() {
        use crate::api::openai::{ChatCompletionChunkChoice, ChatCompletionDelta};

        let mut chunk = ChatCompletionChunk {
            id: "chatcmpl-abc12345".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1_700_000_000,
            model: "gpt-4o-mini".to_string(),
            choices: vec![ChatCompletionChunkChoice {
                index: 0,
                delta: ChatCompletionDelta {
                    role: Some("assistant".to_string()),
                    content: Some("Hel".to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        };

        let mid = chat_chunk_to_ollama(&chunk, "my-model");
        assert_eq!(mid.len(), 1);
        assert!(!mid[0].done);
        assert_eq!(mid[0].message.as_ref().unwrap().content, "Hel");

        chunk.choices[0].finish_reason = Some("stop".to_string());
        let last = chat_chunk_to_ollama(&chunk, "my-model");
        assert!(last[0].done);
    }

    #[test]
    fn test_images_pass_through() {
        let messages = vec![ollama::Message {
            role: "user".to_string(),
            content: "what is this".to_string(),
            images: Some(vec!["aGVsbG8=".to_string()]),
        }];
        let openai = messages_to_openai(&messages);
        assert_eq!(openai[0].images, Some(vec!["aGVsbG8=".to_string()]));
        let back = messages_to_ollama(&openai);
        assert_eq!(back[0].images, messages[0].images);
    }

    #[test]
    fn test_embed_index_order() {
        let response = ollama_embed_to_openai(
            &ollama::EmbedResponse {
                model: "nomic-embed-text".to_string(),
                embeddings: vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]],
            },
            "my-embed",
        );
        for (i, data) in response.data.iter().enumerate() {
            assert_eq!(data.index, i as u32);
        }
        assert_eq!(response.data[2].embedding, vec![0.5, 0.6]);
    }
}
