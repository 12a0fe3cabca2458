use axum::routing::{get, post};
use axum::Router;

use crate::endpoints;
use crate::gateway_util::AppStateData;

/// Registers every route. Method routers reject other verbs with 405.
pub fn build_router(state: AppStateData) -> Router {
    Router::new()
        .route("/", get(endpoints::status::status_handler))
        // Ollama-native API
        .route("/api/version", get(endpoints::ollama::version_handler))
        .route("/api/tags", get(endpoints::ollama::tags_handler))
        .route("/api/ps", get(endpoints::ollama::ps_handler))
        .route("/api/chat", post(endpoints::ollama::chat_handler))
        .route("/api/generate", post(endpoints::ollama::generate_handler))
        .route("/api/embed", post(endpoints::ollama::embed_handler))
        .route("/api/embeddings", post(endpoints::ollama::embed_handler))
        .route("/api/show", post(endpoints::ollama::show_handler))
        // OpenAI-compatible API
        .route("/v1/models", get(endpoints::openai::list_models_handler))
        .route("/v1/models/:name", get(endpoints::openai::get_model_handler))
        .route(
            "/v1/chat/completions",
            post(endpoints::openai::chat_completions_handler),
        )
        .route("/v1/completions", post(endpoints::openai::completions_handler))
        .route("/v1/embeddings", post(endpoints::openai::embeddings_handler))
        .with_state(state)
}
