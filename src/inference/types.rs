use std::collections::HashMap;
use std::pin::Pin;

use futures::stream::Stream;
use serde_json::Value;
use uuid::Uuid;

use crate::api::openai::{
    ChatCompletionChunk, ChatCompletionRequest, CompletionRequest, CompletionResponse,
    ResponseFormat, Tool,
};
use crate::api::ollama;
use crate::error::Error;

/// The enumerated sampling-option bag. Every request envelope converts into
/// this at the edge; an absent option is never sent upstream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub seed: Option<i64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub logit_bias: Option<HashMap<String, f64>>,
    pub response_format: Option<ResponseFormat>,
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<Value>,
    pub user: Option<String>,
}

impl GenerationOptions {
    pub fn from_chat_request(request: &ChatCompletionRequest) -> Self {
        GenerationOptions {
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            max_tokens: request.max_tokens,
            stop: request.stop.clone(),
            seed: request.seed,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            logit_bias: request.logit_bias.clone(),
            response_format: request.response_format.clone(),
            tools: request.tools.clone(),
            tool_choice: request.tool_choice.clone(),
            user: request.user.clone(),
        }
    }

    pub fn from_completion_request(request: &CompletionRequest) -> Self {
        GenerationOptions {
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            stop: request.stop.clone(),
            seed: request.seed,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            logit_bias: request.logit_bias.clone(),
            user: request.user.clone(),
            ..Default::default()
        }
    }

    /// `num_predict` maps to `max_tokens`; the remaining names map directly.
    pub fn from_ollama(options: &ollama::Options) -> Self {
        GenerationOptions {
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            max_tokens: options.num_predict,
            stop: options.stop.clone(),
            seed: options.seed,
            presence_penalty: options.presence_penalty,
            frequency_penalty: options.frequency_penalty,
            ..Default::default()
        }
    }
}

/// Non-restartable, finite stream of chat deltas. The producer closes it on
/// upstream EOF, upstream error, or cancellation.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, Error>> + Send>>;

/// As [`ChatStream`], for the legacy completion dialect.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionResponse, Error>> + Send>>;

pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Synthesizes a completion id such as `chatcmpl-1a2b3c4d`.
pub fn completion_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &hex[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::openai::ChatMessage;

    #[test]
    fn test_completion_id_shape() {
        let id = completion_id("chatcmpl-");
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.len(), "chatcmpl-".len() + 8);
        assert!(id["chatcmpl-".len()..].chars().all(|c| c.is_ascii_hexdigit()));

        // Two streams never share an id
        assert_ne!(completion_id("cmpl-"), completion_id("cmpl-"));
    }

    #[test]
    fn test_options_from_chat_request() {
        let request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
                ..Default::default()
            }],
            temperature: Some(0.7),
            max_tokens: Some(128),
            stop: Some(vec!["\n\n".to_string()]),
            seed: Some(42),
            ..Default::default()
        };
        let options = GenerationOptions::from_chat_request(&request);
        assert_eq!(options.temperature, Some(0.7));
        assert_eq!(options.max_tokens, Some(128));
        assert_eq!(options.stop, Some(vec!["\n\n".to_string()]));
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.top_p, None);
    }

    #[test]
    fn test_options_from_ollama_maps_num_predict() {
        let options = GenerationOptions::from_ollama(&ollama::Options {
            temperature: Some(0.2),
            num_predict: Some(64),
            ..Default::default()
        });
        assert_eq!(options.max_tokens, Some(64));
        assert_eq!(options.temperature, Some(0.2));
    }
}
