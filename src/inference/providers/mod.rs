#[cfg(test)]
pub mod dummy;
pub mod ollama;
pub mod openai;
pub mod provider_trait;

use reqwest::Client;
use secrecy::SecretString;
use url::Url;

use crate::api::openai::{
    ChatCompletionResponse, ChatMessage, CompletionResponse, EmbeddingResponse,
};
use crate::config::{Dialect, ProviderConfig};
use crate::error::{Error, ErrorDetails};
use crate::inference::providers::ollama::OllamaProvider;
use crate::inference::providers::openai::OpenAIProvider;
use crate::inference::providers::provider_trait::InferenceProvider;
use crate::inference::types::{ChatStream, CompletionStream, GenerationOptions};

/// A configured upstream. One wire dialect per variant; dispatch is static.
#[derive(Debug)]
pub enum ProviderClient {
    OpenAI(OpenAIProvider),
    Ollama(OllamaProvider),
    #[cfg(test)]
    Dummy(dummy::DummyProvider),
}

impl ProviderClient {
    pub fn new(name: &str, config: &ProviderConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&config.url).map_err(|e| {
            Error::new(ErrorDetails::InvalidBaseUrl {
                message: format!("Invalid base URL for provider {name}: {e}"),
            })
        })?;
        Ok(match config.dialect {
            Dialect::OpenAI => {
                let api_key = (!config.api_key.is_empty())
                    .then(|| SecretString::new(config.api_key.clone()));
                ProviderClient::OpenAI(OpenAIProvider::new(name.to_string(), base_url, api_key))
            }
            Dialect::Ollama => {
                ProviderClient::Ollama(OllamaProvider::new(name.to_string(), base_url))
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ProviderClient::OpenAI(p) => p.name(),
            ProviderClient::Ollama(p) => p.name(),
            #[cfg(test)]
            ProviderClient::Dummy(p) => p.name(),
        }
    }

    pub async fn chat(
        &self,
        client: &Client,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChatCompletionResponse, Error> {
        match self {
            ProviderClient::OpenAI(p) => p.chat(client, model, messages, options).await,
            ProviderClient::Ollama(p) => p.chat(client, model, messages, options).await,
            #[cfg(test)]
            ProviderClient::Dummy(p) => p.chat(client, model, messages, options).await,
        }
    }

    pub async fn stream_chat(
        &self,
        client: &Client,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<ChatStream, Error> {
        match self {
            ProviderClient::OpenAI(p) => p.stream_chat(client, model, messages, options).await,
            ProviderClient::Ollama(p) => p.stream_chat(client, model, messages, options).await,
            #[cfg(test)]
            ProviderClient::Dummy(p) => p.stream_chat(client, model, messages, options).await,
        }
    }

    pub async fn complete(
        &self,
        client: &Client,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<CompletionResponse, Error> {
        match self {
            ProviderClient::OpenAI(p) => p.complete(client, model, prompt, options).await,
            ProviderClient::Ollama(p) => p.complete(client, model, prompt, options).await,
            #[cfg(test)]
            ProviderClient::Dummy(p) => p.complete(client, model, prompt, options).await,
        }
    }

    pub async fn stream_complete(
        &self,
        client: &Client,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<CompletionStream, Error> {
        match self {
            ProviderClient::OpenAI(p) => p.stream_complete(client, model, prompt, options).await,
            ProviderClient::Ollama(p) => p.stream_complete(client, model, prompt, options).await,
            #[cfg(test)]
            ProviderClient::Dummy(p) => p.stream_complete(client, model, prompt, options).await,
        }
    }

    pub async fn embed(
        &self,
        client: &Client,
        model: &str,
        inputs: &[String],
    ) -> Result<EmbeddingResponse, Error> {
        match self {
            ProviderClient::OpenAI(p) => p.embed(client, model, inputs).await,
            ProviderClient::Ollama(p) => p.embed(client, model, inputs).await,
            #[cfg(test)]
            ProviderClient::Dummy(p) => p.embed(client, model, inputs).await,
        }
    }
}
