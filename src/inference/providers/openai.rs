use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::api::openai::{
    parse_error_response, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, CompletionRequest, CompletionResponse, EmbeddingInput, EmbeddingRequest,
    EmbeddingResponse, Prompt,
};
use crate::error::{Error, ErrorDetails};
use crate::inference::providers::provider_trait::InferenceProvider;
use crate::inference::types::{ChatStream, CompletionStream, GenerationOptions};

/// Client for an OpenAI-dialect upstream: `{base}/chat/completions`,
/// `{base}/completions`, `{base}/embeddings`, SSE streaming.
#[derive(Debug)]
pub struct OpenAIProvider {
    pub name: String,
    pub base_url: Url,
    pub api_key: Option<SecretString>,
}

impl OpenAIProvider {
    pub fn new(name: String, base_url: Url, api_key: Option<SecretString>) -> Self {
        OpenAIProvider {
            name,
            base_url,
            api_key,
        }
    }

    fn request(&self, client: &reqwest::Client, url: Url) -> reqwest::RequestBuilder {
        let mut builder = client.post(url).header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }
        builder
    }
}

pub(super) fn join_url(base_url: &Url, path: &str) -> Result<Url, Error> {
    let mut url = base_url.clone();
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    url.join(path).map_err(|e| {
        Error::new(ErrorDetails::InvalidBaseUrl {
            message: e.to_string(),
        })
    })
}

pub(super) fn handle_openai_error(status: StatusCode, body: &str) -> Error {
    let message = match parse_error_response(body) {
        Some(parsed) => format!("{}: {}", parsed.error.r#type, parsed.error.message),
        None => format!("request failed with status {}: {}", status.as_u16(), body),
    };
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::TOO_MANY_REQUESTS => Error::new(ErrorDetails::OpenAIClient {
            message,
            status_code: status,
        }),
        _ => Error::new(ErrorDetails::OpenAIServer { message }),
    }
}

fn chat_body(
    model: &str,
    messages: &[ChatMessage],
    options: &GenerationOptions,
    stream: bool,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: messages.to_vec(),
        temperature: options.temperature,
        top_p: options.top_p,
        top_k: options.top_k,
        max_tokens: options.max_tokens,
        stop: options.stop.clone(),
        seed: options.seed,
        presence_penalty: options.presence_penalty,
        frequency_penalty: options.frequency_penalty,
        logit_bias: options.logit_bias.clone(),
        response_format: options.response_format.clone(),
        tools: options.tools.clone(),
        tool_choice: options.tool_choice.clone(),
        user: options.user.clone(),
        stream,
    }
}

fn completion_body(
    model: &str,
    prompt: &str,
    options: &GenerationOptions,
    stream: bool,
) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        prompt: Prompt::Single(prompt.to_string()),
        max_tokens: options.max_tokens,
        temperature: options.temperature,
        top_p: options.top_p,
        stop: options.stop.clone(),
        seed: options.seed,
        presence_penalty: options.presence_penalty,
        frequency_penalty: options.frequency_penalty,
        logit_bias: options.logit_bias.clone(),
        user: options.user.clone(),
        stream,
    }
}

impl InferenceProvider for OpenAIProvider {
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
        let url = join_url(&self.base_url, "chat/completions")?;
        let body = chat_body(model, messages, options, false);
        let res = self
            .request(client, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::InferenceClient {
                    message: format!("Error sending request to {}: {e}", self.name),
                })
            })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_openai_error(status, &body));
        }
        res.json().await.map_err(|e| {
            Error::new(ErrorDetails::OpenAIServer {
                message: format!("Error parsing JSON response: {e}"),
            })
        })
    }

    async fn stream_chat<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: &'a GenerationOptions,
    ) -> Result<ChatStream, Error> {
        let url = join_url(&self.base_url, "chat/completions")?;
        let body = chat_body(model, messages, options, true);
        let event_source = self.request(client, url).json(&body).eventsource().map_err(|e| {
            Error::new(ErrorDetails::InferenceClient {
                message: format!("Error sending request to {}: {e}", self.name),
            })
        })?;

        let mut stream = Box::pin(stream_openai(event_source));
        // Surface a dead target before any bytes are committed to the client:
        // pull one chunk here, then chain it back onto the stream.
        let first = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(Error::new(ErrorDetails::OpenAIServer {
                    message: "Stream ended before first chunk".to_string(),
                }))
            }
        };
        Ok(Box::pin(
            futures::stream::once(async move { Ok(first) }).chain(stream),
        ))
    }

    async fn complete<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> Result<CompletionResponse, Error> {
        let url = join_url(&self.base_url, "completions")?;
        let body = completion_body(model, prompt, options, false);
        let res = self
            .request(client, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::InferenceClient {
                    message: format!("Error sending request to {}: {e}", self.name),
                })
            })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_openai_error(status, &body));
        }
        res.json().await.map_err(|e| {
            Error::new(ErrorDetails::OpenAIServer {
                message: format!("Error parsing JSON response: {e}"),
            })
        })
    }

    async fn stream_complete<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> Result<CompletionStream, Error> {
        let url = join_url(&self.base_url, "completions")?;
        let body = completion_body(model, prompt, options, true);
        let event_source = self.request(client, url).json(&body).eventsource().map_err(|e| {
            Error::new(ErrorDetails::InferenceClient {
                message: format!("Error sending request to {}: {e}", self.name),
            })
        })?;

        let mut stream = Box::pin(stream_openai_completions(event_source));
        let first = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(Error::new(ErrorDetails::OpenAIServer {
                    message: "Stream ended before first chunk".to_string(),
                }))
            }
        };
        Ok(Box::pin(
            futures::stream::once(async move { Ok(first) }).chain(stream),
        ))
    }

    async fn embed<'a>(
        &'a self,
        client: &'a reqwest::Client,
        model: &'a str,
        inputs: &'a [String],
    ) -> Result<EmbeddingResponse, Error> {
        let url = join_url(&self.base_url, "embeddings")?;
        let body = EmbeddingRequest {
            model: model.to_string(),
            input: EmbeddingInput::Batch(inputs.to_vec()),
            ..Default::default()
        };
        let res = self
            .request(client, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::InferenceClient {
                    message: format!("Error sending request to {}: {e}", self.name),
                })
            })?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(handle_openai_error(status, &body));
        }
        let mut response: EmbeddingResponse = res.json().await.map_err(|e| {
            Error::new(ErrorDetails::OpenAIServer {
                message: format!("Error parsing JSON response: {e}"),
            })
        })?;
        // Input order is part of the contract: data[i].index == i
        response.data.sort_by_key(|d| d.index);
        Ok(response)
    }
}

/// Consumes an SSE event source of chat chunks. Terminates on
/// `data: [DONE]`; malformed chunks are skipped mid-stream.
fn stream_openai(
    mut event_source: EventSource,
) -> impl futures::Stream<Item = Result<ChatCompletionChunk, Error>> {
    async_stream::stream! {
        while let Some(ev) = event_source.next().await {
            match ev {
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield Err(handle_openai_error(status, &body));
                    break;
                }
                Err(e) => {
                    yield Err(Error::new(ErrorDetails::OpenAIServer {
                        message: e.to_string(),
                    }));
                    break;
                }
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        break;
                    }
                    match serde_json::from_str::<ChatCompletionChunk>(&message.data) {
                        Ok(chunk) => yield Ok(chunk),
                        Err(e) => {
                            tracing::debug!(error = %e, "Skipping malformed stream chunk");
                            continue;
                        }
                    }
                }
            }
        }
        event_source.close();
    }
}

/// As [`stream_openai`], for the legacy completions dialect.
fn stream_openai_completions(
    mut event_source: EventSource,
) -> impl futures::Stream<Item = Result<CompletionResponse, Error>> {
    async_stream::stream! {
        while let Some(ev) = event_source.next().await {
            match ev {
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield Err(handle_openai_error(status, &body));
                    break;
                }
                Err(e) => {
                    yield Err(Error::new(ErrorDetails::OpenAIServer {
                        message: e.to_string(),
                    }));
                    break;
                }
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        break;
                    }
                    match serde_json::from_str::<CompletionResponse>(&message.data) {
                        Ok(chunk) => yield Ok(chunk),
                        Err(e) => {
                            tracing::debug!(error = %e, "Skipping malformed stream chunk");
                            continue;
                        }
                    }
                }
            }
        }
        event_source.close();
    }
}
