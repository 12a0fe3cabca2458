//! Scripted provider for exercising dispatch, tracking, and the streaming
//! pumps without network I/O. Behavior is keyed by the upstream model name.

use crate::api::openai::{
    ChatCompletionChoice, ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionDelta,
    ChatCompletionResponse, ChatMessage, CompletionChoice, CompletionResponse, EmbeddingData,
    EmbeddingResponse, Usage,
};
use crate::error::{Error, ErrorDetails};
use crate::inference::providers::provider_trait::InferenceProvider;
use crate::inference::types::{
    current_timestamp, ChatStream, CompletionStream, GenerationOptions,
};

pub static DUMMY_CHAT_CONTENT: &str = "OK";
pub static DUMMY_STREAMING_CHUNKS: [&str; 2] = ["Hel", "lo"];
pub static DUMMY_EMBEDDING: [f64; 3] = [0.1, 0.2, 0.3];

/// Model names and what they do:
/// - `good`: succeeds for every operation
/// - `error`: every call returns an upstream error
/// - `stream_error`: stream construction fails before any chunk
/// - `midstream_error`: one chunk, then a transport error
#[derive(Debug, Default)]
pub struct DummyProvider {
    pub name: String,
}

impl DummyProvider {
    pub fn new(name: impl Into<String>) -> Self {
        DummyProvider { name: name.into() }
    }

    fn upstream_error(&self, model: &str) -> Error {
        Error::new(ErrorDetails::InferenceClient {
            message: format!("Dummy provider {} failed for model {model}", self.name),
        })
    }
}

fn dummy_usage() -> Usage {
    Usage {
        prompt_tokens: 3,
        completion_tokens: 1,
        total_tokens: 4,
    }
}

fn chunk(id: &str, model: &str, content: Option<&str>, finish_reason: Option<&str>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created: current_timestamp(),
        model: model.to_string(),
        choices: vec![ChatCompletionChunkChoice {
            index: 0,
            delta: ChatCompletionDelta {
                role: Some("assistant".to_string()),
                content: content.map(String::from),
                tool_calls: None,
            },
            finish_reason: finish_reason.map(String::from),
        }],
        usage: None,
    }
}

impl InferenceProvider for DummyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat<'a>(
        &'a self,
        _client: &'a reqwest::Client,
        model: &'a str,
        _messages: &'a [ChatMessage],
        _options: &'a GenerationOptions,
    ) -> Result<ChatCompletionResponse, Error> {
        if model != "good" {
            return Err(self.upstream_error(model));
        }
        Ok(ChatCompletionResponse {
            id: "chatcmpl-dummy123".to_string(),
            object: "chat.completion".to_string(),
            created: current_timestamp(),
            model: model.to_string(),
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: DUMMY_CHAT_CONTENT.to_string(),
                    ..Default::default()
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(dummy_usage()),
        })
    }

    async fn stream_chat<'a>(
        &'a self,
        _client: &'a reqwest::Client,
        model: &'a str,
        _messages: &'a [ChatMessage],
        _options: &'a GenerationOptions,
    ) -> Result<ChatStream, Error> {
        match model {
            "good" => {
                let model = model.to_string();
                Ok(Box::pin(async_stream::stream! {
                    for content in DUMMY_STREAMING_CHUNKS {
                        yield Ok(chunk("chatcmpl-upstream", &model, Some(content), None));
                    }
                    yield Ok(chunk("chatcmpl-upstream", &model, None, Some("stop")));
                }))
            }
            "midstream_error" => {
                let model = model.to_string();
                let error = Error::new(ErrorDetails::Stream {
                    message: "connection reset mid-stream".to_string(),
                });
                Ok(Box::pin(async_stream::stream! {
                    yield Ok(chunk("chatcmpl-upstream", &model, Some(DUMMY_STREAMING_CHUNKS[0]), None));
                    yield Err(error);
                }))
            }
            _ => Err(self.upstream_error(model)),
        }
    }

    async fn complete<'a>(
        &'a self,
        _client: &'a reqwest::Client,
        model: &'a str,
        _prompt: &'a str,
        _options: &'a GenerationOptions,
    ) -> Result<CompletionResponse, Error> {
        if model != "good" {
            return Err(self.upstream_error(model));
        }
        Ok(CompletionResponse {
            id: "cmpl-dummy123".to_string(),
            object: "text_completion".to_string(),
            created: current_timestamp(),
            model: model.to_string(),
            choices: vec![CompletionChoice {
                text: DUMMY_CHAT_CONTENT.to_string(),
                index: 0,
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(dummy_usage()),
        })
    }

    async fn stream_complete<'a>(
        &'a self,
        _client: &'a reqwest::Client,
        model: &'a str,
        _prompt: &'a str,
        _options: &'a GenerationOptions,
    ) -> Result<CompletionStream, Error> {
        if model != "good" {
            return Err(self.upstream_error(model));
        }
        let model = model.to_string();
        Ok(Box::pin(async_stream::stream! {
            for (i, content) in DUMMY_STREAMING_CHUNKS.iter().enumerate() {
                let last = i == DUMMY_STREAMING_CHUNKS.len() - 1;
                yield Ok(CompletionResponse {
                    id: "cmpl-upstream".to_string(),
                    object: "text_completion".to_string(),
                    created: current_timestamp(),
                    model: model.clone(),
                    choices: vec![CompletionChoice {
                        text: content.to_string(),
                        index: 0,
                        finish_reason: last.then(|| "stop".to_string()),
                    }],
                    usage: None,
                });
            }
        }))
    }

    async fn embed<'a>(
        &'a self,
        _client: &'a reqwest::Client,
        model: &'a str,
        inputs: &'a [String],
    ) -> Result<EmbeddingResponse, Error> {
        if model != "good" {
            return Err(self.upstream_error(model));
        }
        Ok(EmbeddingResponse {
            object: "list".to_string(),
            data: inputs
                .iter()
                .enumerate()
                .map(|(i, _)| EmbeddingData {
                    object: "embedding".to_string(),
                    index: i as u32,
                    embedding: DUMMY_EMBEDDING.to_vec(),
                })
                .collect(),
            model: model.to_string(),
            usage: Some(dummy_usage()),
        })
    }
}
