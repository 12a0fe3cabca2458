//! Types for the Ollama-native API surface and upstream dialect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ListResponse {
    pub models: Vec<ListModelResponse>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ListModelResponse {
    pub name: String,
    pub model: String,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub parent_model: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub families: Vec<String>,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: String,
    /// Base64-encoded images, passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// "json" requests structured output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatResponse {
    pub model: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub done: bool,
    #[serde(flatten)]
    pub metrics: Option<Metrics>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub raw: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GenerateResponse {
    pub model: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub response: String,
    pub done: bool,
    #[serde(flatten)]
    pub metrics: Option<Metrics>,
}

/// `input` accepts either a single string or an array of strings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EmbedInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbedInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            EmbedInput::Single(s) => vec![s],
            EmbedInput::Batch(v) => v,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: EmbedInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmbedResponse {
    pub model: String,
    pub embeddings: Vec<Vec<f64>>,
}

/// Performance counters reported on a final (`done: true`) response.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Metrics {
    #[serde(default)]
    pub prompt_eval_count: u32,
    #[serde(default)]
    pub eval_count: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_duration: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub load_duration: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub prompt_eval_duration: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub eval_duration: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatusError {
    pub error: String,
    #[serde(default)]
    pub status_code: u16,
}

/// Probes a non-2xx body for an Ollama-shaped structured error.
pub fn parse_status_error(body: &str) -> Option<StatusError> {
    let parsed: StatusError = serde_json::from_str(body).ok()?;
    if parsed.error.is_empty() {
        return None;
    }
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_error() {
        let body = r#"{"error": "model \"llama9\" not found", "status_code": 404}"#;
        let parsed = parse_status_error(body).unwrap();
        assert_eq!(parsed.error, "model \"llama9\" not found");
        assert_eq!(parsed.status_code, 404);

        assert!(parse_status_error("<html>busy</html>").is_none());
        assert!(parse_status_error(r#"{"error": ""}"#).is_none());
    }

    #[test]
    fn test_chat_response_flattens_metrics() {
        let response = ChatResponse {
            model: "llama3.2".to_string(),
            created_at: Utc::now(),
            message: Some(Message {
                role: "assistant".to_string(),
                content: "hi".to_string(),
                images: None,
            }),
            done: true,
            metrics: Some(Metrics {
                prompt_eval_count: 12,
                eval_count: 7,
                ..Default::default()
            }),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["prompt_eval_count"], 12);
        assert_eq!(value["eval_count"], 7);
        assert!(value.get("metrics").is_none());
    }

    #[test]
    fn test_embed_input_forms() {
        let single: EmbedInput = serde_json::from_str(r#""text""#).unwrap();
        assert_eq!(single.into_vec(), vec!["text".to_string()]);
        let batch: EmbedInput = serde_json::from_str(r#"["a", "b", "c"]"#).unwrap();
        assert_eq!(batch.into_vec().len(), 3);
    }
}
