//! Miscellaneous handlers.

use axum::Json;
use serde_json::{Value, json};

/// Health check. Unauthenticated by design; load balancers hit this.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
