use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{rejection::JsonRejection, FromRequest, Json, Request};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::config::Config;
use crate::error::{Error, ErrorDetails};
use crate::inference::providers::ProviderClient;
use crate::state::AvailabilityTracker;

/// Ceiling on every upstream request. Independent of the progressive
/// timeout, which only governs the client-visible back-off hint.
pub const UPSTREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// State for the API
#[derive(Clone)]
pub struct AppStateData {
    pub config: Arc<Config>,
    pub http_client: Client,
    pub providers: Arc<HashMap<String, ProviderClient>>,
    pub tracker: Arc<AvailabilityTracker>,
}
pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    pub fn new(config: Arc<Config>) -> Result<Self, Error> {
        let providers = build_providers(&config)?;
        let http_client = Client::builder()
            .timeout(UPSTREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::new(ErrorDetails::Config {
                    message: format!("Failed to build HTTP client: {e}"),
                })
            })?;
        let tracker = AvailabilityTracker::new(config.thresholds.initial_timeout_ms);
        Ok(Self {
            config,
            http_client,
            providers: Arc::new(providers),
            tracker: Arc::new(tracker),
        })
    }
}

pub fn build_providers(config: &Config) -> Result<HashMap<String, ProviderClient>, Error> {
    config
        .providers
        .iter()
        .map(|(name, provider_config)| {
            ProviderClient::new(name, provider_config).map(|client| {
                tracing::info!(provider = %name, url = %provider_config.url, "Provider initialized");
                (name.clone(), client)
            })
        })
        .collect()
}

/// Custom Axum extractor that validates the JSON body and deserializes it
/// into a custom type, reporting the offending path on failure.
///
/// When this extractor is present, we don't check if the `Content-Type`
/// header is `application/json`, and instead simply assume that the request
/// body is a JSON object.
pub struct StructuredJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for StructuredJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Send + Sync + DeserializeOwned,
{
    type Rejection = Error;

    #[instrument(skip_all, level = "trace", name = "StructuredJson::from_request")]
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = bytes::Bytes::from_request(req, state)
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::JsonRequest {
                    message: format!("{} ({})", e, e.status()),
                })
            })?;

        let value = Json::<serde_json::Value>::from_bytes(&bytes)
            .map_err(|e| {
                Error::new(ErrorDetails::JsonRequest {
                    message: format!("{} ({})", e, e.status()),
                })
            })?
            .0;

        let deserialized: T = serde_path_to_error::deserialize(&value).map_err(|e| {
            Error::new(ErrorDetails::JsonRequest {
                message: e.to_string(),
            })
        })?;

        Ok(StructuredJson(deserialized))
    }
}


#[cfg(test)]
pub mod test_util {
    use super::*;
    use crate::config::{ModelTarget, ThresholdsConfig};
    use crate::inference::providers::dummy::DummyProvider;

    /// App state backed by dummy providers; `chains` maps logical model
    /// names to `(provider, upstream_model)` pairs.
    pub fn dummy_state(
        provider_names: &[&str],
        chains: &[(&str, Vec<(&str, &str)>)],
        thresholds: ThresholdsConfig,
    ) -> AppStateData {
        let mut config = Config::default();
        config.thresholds = thresholds;
        config.models = chains
            .iter()
            .map(|(model, chain)| {
                (
                    model.to_string(),
                    chain
                        .iter()
                        .map(|(provider, upstream)| ModelTarget {
                            provider: provider.to_string(),
                            model: upstream.to_string(),
                        })
                        .collect(),
                )
            })
            .collect();

        let providers: HashMap<String, ProviderClient> = provider_names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    ProviderClient::Dummy(DummyProvider::new(*name)),
                )
            })
            .collect();

        let tracker = AvailabilityTracker::new(config.thresholds.initial_timeout_ms);
        AppStateData {
            config: Arc::new(config),
            http_client: Client::new(),
            providers: Arc::new(providers),
            tracker: Arc::new(tracker),
        }
    }
}
