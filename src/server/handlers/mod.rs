pub mod chat;
pub mod feedback;
pub mod js_macro;
pub mod plan;

use axum::Json;
use serde_json::{json, Value};

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ah32",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
