use futures::Future;
use reqwest::Client;

use crate::api::openai::{ChatCompletionResponse, ChatMessage, CompletionResponse, EmbeddingResponse};
use crate::error::Error;
use crate::inference::types::{ChatStream, CompletionStream, GenerationOptions};

/// The uniform contract every upstream implements, whatever its wire
/// dialect. Streaming methods return a non-restartable, finite stream whose
/// last delivered element carries a finish reason; the producer closes the
/// stream on upstream EOF, upstream error, or cancellation.
pub trait InferenceProvider {
    fn name(&self) -> &str;

    fn chat<'a>(
        &'a self,
        client: &'a Client,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: &'a GenerationOptions,
    ) -> impl Future<Output = Result<ChatCompletionResponse, Error>> + Send + 'a;

    fn stream_chat<'a>(
        &'a self,
        client: &'a Client,
        model: &'a str,
        messages: &'a [ChatMessage],
        options: &'a GenerationOptions,
    ) -> impl Future<Output = Result<ChatStream, Error>> + Send + 'a;

    fn complete<'a>(
        &'a self,
        client: &'a Client,
        model: &'a str,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> impl Future<Output = Result<CompletionResponse, Error>> + Send + 'a;

    fn stream_complete<'a>(
        &'a self,
        client: &'a Client,
        model: &'a str,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> impl Future<Output = Result<CompletionStream, Error>> + Send + 'a;

    fn embed<'a>(
        &'a self,
        client: &'a Client,
        model: &'a str,
        inputs: &'a [String],
    ) -> impl Future<Output = Result<EmbeddingResponse, Error>> + Send + 'a;
}
