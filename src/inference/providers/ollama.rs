use bytes::BytesMut;
use futures::StreamExt;
use reqwest::StatusCode;
use url::Url;

use crate::api::ollama::{
    parse_status_error, ChatRequest, ChatResponse, EmbedInput, EmbedRequest, EmbedResponse,
    GenerateRequest, GenerateResponse,
};
use crate::api::openai::{ChatCompletionResponse, ChatMessage, CompletionResponse, EmbeddingResponse};
use crate::bridge;
use crate::error::{Error, ErrorDetails};
use crate::inference::providers::openai::join_url;
use crate::inference::providers::provider_trait::InferenceProvider;
use crate::inference::types::{
    completion_id, current_timestamp, ChatStream, CompletionStream, GenerationOptions,
};

/// Client for an Ollama-dialect upstream: `{base}/api/chat`,
/// `{base}/api/generate`, `{base}/api/embed`, NDJSON streaming.
#[derive(Debug)]
pub struct OllamaProvider {
    pub name: String,
    pub base_url: Url,
}

impl OllamaProvider {
    pub fn new(name: String, base_url: Url) -> Self {
        OllamaProvider { name, base_url }
    }
}

pub(super) fn handle_ollama_error(status: StatusCode, body: &str) -> Error {
    match parse_status_error(body) {
        Some(parsed) => Error::new(ErrorDetails::OllamaClient {
            message: parsed.error,
            status_code: StatusCode::from_u16(parsed.status_code)
                .unwrap_or(status),
        }),
        None => Error::new(ErrorDetails::OllamaServer {
            message: format!("request failed with status {}: {}", status.as_u16(), body),
        }),
    }
}

/// JSON mode maps to Ollama's `format: "json"`.
fn format_from_options(options: &GenerationOptions) -> Option<String> {
    options
        .response_format
        .as_ref()
        .filter(|f| f.r#type == "json_object" || f.r#type == "json_schema")
        .map(|_| "json".to_string())
}

/// Splits an NDJSON body into parsed values, skipping malformed lines, and
/// terminates once `is_done` reports a final chunk.
fn ndjson_stream<T>(
    response: reqwest::Response,
    provider_name: String,
    is_done: fn(&T) -> bool,
) -> impl futures::Stream<Item = Result<T, Error>>
where
    T: serde::de::DeserializeOwned,
{
    async_stream::stream! {
        let mut body = response.bytes_stream();
        let mut buf = BytesMut::new();
        'outer: while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::new(ErrorDetails::OllamaServer {
                        message: format!("Error reading stream from {provider_name}: {e}"),
                    }));
                    break;
                }
            };
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line = buf.split_to(pos + 1);
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<T>(line) {
                    Ok(parsed) => {
                        let done = is_done(&parsed);
                        yield Ok(parsed);
                        if done {
                            break 'outer;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping malformed stream line");
                        continue;
                    }
                }
            }
        }
    }
}

impl InferenceProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: &'a GenerationOptions,
    ) -> Result<ChatCompletionResponse, Error> {
        let url = join_url(&self.base_url, "api/chat")?;
        let body = ChatRequest {
            model: model.to_string(),
            messages: bridge::messages_to_ollama(messages),
            stream: Some(false),
            format: format_from_options(options),
            options: bridge::options_to_ollama(options),
        };
        let res = client.post(url).json(&body).send().await.map_err(|e| {
            Error::new(ErrorDetails::InferenceClient {
                message: format!("Error sending request to {}: {e}", self.name),
            })
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_ollama_error(status, &body));
        }
        let response: ChatResponse = res.json().await.map_err(|e| {
            Error::new(ErrorDetails::OllamaServer {
                message: format!("Error parsing JSON response: {e}"),
            })
        })?;
        Ok(bridge::ollama_chat_to_openai(&response, model))
    }

    async fn stream_chat<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: &'a GenerationOptions,
    ) -> Result<ChatStream, Error> {
        let url = join_url(&self.base_url, "api/chat")?;
        let body = ChatRequest {
            model: model.to_string(),
            messages: bridge::messages_to_ollama(messages),
            stream: Some(true),
            format: format_from_options(options),
            options: bridge::options_to_ollama(options),
        };
        let res = client.post(url).json(&body).send().await.map_err(|e| {
            Error::new(ErrorDetails::InferenceClient {
                message: format!("Error sending request to {}: {e}", self.name),
            })
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_ollama_error(status, &body));
        }

        let id = completion_id("chatcmpl-");
        let created = current_timestamp();
        let model = model.to_string();
        let lines = ndjson_stream(res, self.name.clone(), |chunk: &ChatResponse| chunk.done);
        Ok(Box::pin(async_stream::stream! {
            futures::pin_mut!(lines);
            while let Some(item) = lines.next().await {
                match item {
                    Ok(chunk) => {
                        yield Ok(bridge::ollama_chat_chunk_to_openai(&chunk, &id, created, &model));
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }))
    }

    async fn complete<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> Result<CompletionResponse, Error> {
        let url = join_url(&self.base_url, "api/generate")?;
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: Some(false),
            raw: false,
            format: format_from_options(options),
            images: None,
            options: bridge::options_to_ollama(options),
        };
        let res = client.post(url).json(&body).send().await.map_err(|e| {
            Error::new(ErrorDetails::InferenceClient {
                message: format!("Error sending request to {}: {e}", self.name),
            })
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_ollama_error(status, &body));
        }
        let response: GenerateResponse = res.json().await.map_err(|e| {
            Error::new(ErrorDetails::OllamaServer {
                message: format!("Error parsing JSON response: {e}"),
            })
        })?;
        Ok(bridge::ollama_generate_to_completion(&response, model))
    }

    async fn stream_complete<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> Result<CompletionStream, Error> {
        let url = join_url(&self.base_url, "api/generate")?;
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: Some(true),
            raw: false,
            format: format_from_options(options),
            images: None,
            options: bridge::options_to_ollama(options),
        };
        let res = client.post(url).json(&body).send().await.map_err(|e| {
            Error::new(ErrorDetails::InferenceClient {
                message: format!("Error sending request to {}: {e}", self.name),
            })
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_ollama_error(status, &body));
        }

        let id = completion_id("cmpl-");
        let created = current_timestamp();
        let model = model.to_string();
        let lines = ndjson_stream(res, self.name.clone(), |chunk: &GenerateResponse| chunk.done);
        Ok(Box::pin(async_stream::stream! {
            futures::pin_mut!(lines);
            while let Some(item) = lines.next().await {
                match item {
                    Ok(chunk) => {
                        yield Ok(bridge::ollama_generate_chunk_to_completion(&chunk, &id, created, &model));
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }))
    }

    async fn embed<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        inputs: &'a [String],
    ) -> Result<EmbeddingResponse, Error> {
        let url = join_url(&self.base_url, "api/embed")?;
        let body = EmbedRequest {
            model: model.to_string(),
            input: EmbedInput::Batch(inputs.to_vec()),
            options: None,
        };
        let res = client.post(url).json(&body).send().await.map_err(|e| {
            Error::new(ErrorDetails::InferenceClient {
                message: format!("Error sending request to {}: {e}", self.name),
            })
        })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_ollama_error(status, &body));
        }
        let response: EmbedResponse = res.json().await.map_err(|e| {
            Error::new(ErrorDetails::OllamaServer {
                message: format!("Error parsing JSON response: {e}"),
            })
        })?;
        Ok(bridge::ollama_embed_to_openai(&response, model))
    }
}
