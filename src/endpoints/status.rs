use axum::response::Json;
use serde_json::{json, Value};

pub const VERSION: &str = "0.1.0";

/// A handler for `GET /`
pub async fn status_handler() -> Json<Value> {
    Json(json!({
        "name": "openmodel",
        "version": VERSION,
        "status": "running",
    }))
}
