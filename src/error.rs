use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// As long as the struct member is private, we force people to use the `new`
/// method and log the error.
#[derive(Debug, PartialEq)]
pub struct Error(ErrorDetails);

impl Error {
    pub fn new(details: ErrorDetails) -> Self {
        details.log();
        Error(details)
    }

    pub fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    pub fn get_details(&self) -> &ErrorDetails {
        &self.0
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<ErrorDetails> for Error {
    fn from(details: ErrorDetails) -> Self {
        Error::new(details)
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorDetails {
    ChainExhausted {
        message: String,
        retry_after_secs: u64,
    },
    Config {
        message: String,
    },
    InferenceClient {
        message: String,
    },
    InvalidBaseUrl {
        message: String,
    },
    InvalidRequest {
        message: String,
    },
    JsonRequest {
        message: String,
    },
    Observability {
        message: String,
    },
    OllamaClient {
        message: String,
        status_code: StatusCode,
    },
    OllamaServer {
        message: String,
    },
    OpenAIClient {
        message: String,
        status_code: StatusCode,
    },
    OpenAIServer {
        message: String,
    },
    ProviderNotFound {
        provider_name: String,
    },
    Serialization {
        message: String,
    },
    Stream {
        message: String,
    },
    UnknownModel {
        name: String,
    },
}

impl ErrorDetails {
    /// Which level to log the error at
    fn level(&self) -> tracing::Level {
        match self {
            ErrorDetails::ChainExhausted { .. } => tracing::Level::WARN,
            ErrorDetails::Config { .. } => tracing::Level::ERROR,
            ErrorDetails::InferenceClient { .. } => tracing::Level::WARN,
            ErrorDetails::InvalidBaseUrl { .. } => tracing::Level::ERROR,
            ErrorDetails::InvalidRequest { .. } => tracing::Level::DEBUG,
            ErrorDetails::JsonRequest { .. } => tracing::Level::DEBUG,
            ErrorDetails::Observability { .. } => tracing::Level::ERROR,
            ErrorDetails::OllamaClient { .. } => tracing::Level::WARN,
            ErrorDetails::OllamaServer { .. } => tracing::Level::WARN,
            ErrorDetails::OpenAIClient { .. } => tracing::Level::WARN,
            ErrorDetails::OpenAIServer { .. } => tracing::Level::WARN,
            ErrorDetails::ProviderNotFound { .. } => tracing::Level::WARN,
            ErrorDetails::Serialization { .. } => tracing::Level::ERROR,
            ErrorDetails::Stream { .. } => tracing::Level::WARN,
            ErrorDetails::UnknownModel { .. } => tracing::Level::DEBUG,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ErrorDetails::ChainExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ErrorDetails::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InferenceClient { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidBaseUrl { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::JsonRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::Observability { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::OllamaClient { status_code, .. } => *status_code,
            ErrorDetails::OllamaServer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::OpenAIClient { status_code, .. } => *status_code,
            ErrorDetails::OpenAIServer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::ProviderNotFound { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Stream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::UnknownModel { .. } => StatusCode::NOT_FOUND,
        }
    }

    /// Log the error using the `tracing` library
    pub fn log(&self) {
        match self.level() {
            tracing::Level::ERROR => tracing::error!("{self}"),
            tracing::Level::WARN => tracing::warn!("{self}"),
            tracing::Level::INFO => tracing::info!("{self}"),
            tracing::Level::DEBUG => tracing::debug!("{self}"),
            tracing::Level::TRACE => tracing::trace!("{self}"),
        }
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetails::ChainExhausted { message, .. } => write!(f, "{}", message),
            ErrorDetails::Config { message } => write!(f, "{}", message),
            ErrorDetails::InferenceClient { message } => write!(f, "{}", message),
            ErrorDetails::InvalidBaseUrl { message } => write!(f, "{}", message),
            ErrorDetails::InvalidRequest { message } => write!(f, "{}", message),
            ErrorDetails::JsonRequest { message } => {
                write!(f, "invalid request body: {}", message)
            }
            ErrorDetails::Observability { message } => write!(f, "{}", message),
            ErrorDetails::OllamaClient { message, .. } => {
                write!(f, "Error from Ollama client: {}", message)
            }
            ErrorDetails::OllamaServer { message } => {
                write!(f, "Error from Ollama server: {}", message)
            }
            ErrorDetails::OpenAIClient { message, .. } => {
                write!(f, "Error from OpenAI client: {}", message)
            }
            ErrorDetails::OpenAIServer { message } => {
                write!(f, "Error from OpenAI server: {}", message)
            }
            ErrorDetails::ProviderNotFound { provider_name } => {
                write!(f, "Provider not found: {}", provider_name)
            }
            ErrorDetails::Serialization { message } => write!(f, "{}", message),
            ErrorDetails::Stream { message } => write!(f, "{}", message),
            ErrorDetails::UnknownModel { name } => {
                write!(f, "model {:?} not found", name)
            }
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    /// Convert the error into an Axum response; chain exhaustion carries the
    /// progressive back-off hint in a `Retry-After` header.
    fn into_response(self) -> Response {
        let body = json!({"error": self.to_string()});
        let mut response = (self.status_code(), Json(body)).into_response();
        if let ErrorDetails::ChainExhausted {
            retry_after_secs, ..
        } = self.get_details()
        {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
